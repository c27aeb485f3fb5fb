use core::ffi::c_int;

use crate::manager::{
  CmError,
  CmResult,
};

pub fn make_non_blocking(fd: c_int) -> CmResult<()> {
  let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
  if flags < 0 {
    return Err(CmError::last_os());
  }
  if flags & libc::O_NONBLOCK != 0 {
    return Ok(());
  }

  if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
    return Err(CmError::last_os());
  }
  Ok(())
}

pub fn make_close_on_exec(fd: c_int) -> CmResult<()> {
  let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
  if flags < 0 {
    return Err(CmError::last_os());
  }
  if flags & libc::FD_CLOEXEC != 0 {
    return Ok(());
  }

  if unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
    return Err(CmError::last_os());
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pipe_fds() -> (c_int, c_int) {
    let mut fds = [0 as c_int; 2];
    let result = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(result, 0);
    (fds[0], fds[1])
  }

  #[test]
  fn sets_non_blocking() {
    let (read_fd, write_fd) = pipe_fds();

    make_non_blocking(read_fd).unwrap();
    let flags = unsafe { libc::fcntl(read_fd, libc::F_GETFL) };
    assert!(flags & libc::O_NONBLOCK != 0);

    // Idempotent.
    make_non_blocking(read_fd).unwrap();

    unsafe {
      libc::close(read_fd);
      libc::close(write_fd);
    }
  }

  #[test]
  fn sets_close_on_exec() {
    let (read_fd, write_fd) = pipe_fds();

    make_close_on_exec(write_fd).unwrap();
    let flags = unsafe { libc::fcntl(write_fd, libc::F_GETFD) };
    assert!(flags & libc::FD_CLOEXEC != 0);

    unsafe {
      libc::close(read_fd);
      libc::close(write_fd);
    }
  }

  #[test]
  fn rejects_bad_fd() {
    assert!(make_non_blocking(-1).is_err());
    assert!(make_close_on_exec(-1).is_err());
  }
}
