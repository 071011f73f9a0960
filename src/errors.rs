use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::io;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
  Truncated,
  Corruption,
  BufferFull,
  LimitExceeded,
  InvalidState,
  Io,
}

#[derive(Debug)]
pub struct DemoError {
  pub kind: ErrorKind,
  pub message: String,
  io_source: Option<io::Error>,
}

impl DemoError {
  pub fn new<S: AsRef<str>>(kind: ErrorKind, message: S) -> Self {
    DemoError {
      kind,
      message: message.as_ref().to_string(),
      io_source: None,
    }
  }

  pub fn truncated<S: AsRef<str>>(message: S) -> Self {
    Self::new(ErrorKind::Truncated, message)
  }

  pub fn corruption<S: AsRef<str>>(message: S) -> Self {
    Self::new(ErrorKind::Corruption, message)
  }

  pub fn buffer_full<S: AsRef<str>>(message: S) -> Self {
    Self::new(ErrorKind::BufferFull, message)
  }

  pub fn limit_exceeded<S: AsRef<str>>(message: S) -> Self {
    Self::new(ErrorKind::LimitExceeded, message)
  }

  pub fn invalid_state<S: AsRef<str>>(message: S) -> Self {
    Self::new(ErrorKind::InvalidState, message)
  }
}

impl Display for DemoError {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "demo {:?} error: {}", self.kind, &self.message)
  }
}

impl Error for DemoError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    self.io_source.as_ref().map(|e| e as &(dyn Error + 'static))
  }
}

impl From<io::Error> for DemoError {
  fn from(e: io::Error) -> Self {
    DemoError {
      kind: ErrorKind::Io,
      message: e.to_string(),
      io_source: Some(e),
    }
  }
}

impl Clone for DemoError {
  fn clone(&self) -> Self {
    DemoError {
      kind: self.kind,
      message: self.message.clone(),
      io_source: self.io_source.as_ref().map(|e| io::Error::new(e.kind(), e.to_string())),
    }
  }
}

impl PartialEq for DemoError {
  fn eq(&self, other: &Self) -> bool {
    self.kind == other.kind && self.message == other.message
  }
}

impl Eq for DemoError {}

pub type DemoResult<T> = Result<T, DemoError>;
