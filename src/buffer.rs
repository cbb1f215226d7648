//! Numeric buffer boundary.
//!
//! Points reach the clients through a [`BufferAdaptor`], the minimal view of a
//! host-owned sample buffer. [`VecBuffer`] is the in-memory implementation
//! used by the CLI, the HTTP API and the tests.

use crate::error::{KnnError, Result};

pub trait BufferAdaptor {
    /// Whether the buffer still refers to live storage.
    fn exists(&self) -> bool;
    fn num_frames(&self) -> usize;
    fn samples(&self) -> &[f64];
    fn samples_mut(&mut self) -> &mut [f64];
    fn resize(&mut self, frames: usize) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VecBuffer {
    frames: Vec<f64>,
    released: bool,
}

impl VecBuffer {
    pub fn new(frames: Vec<f64>) -> VecBuffer {
        VecBuffer { frames, released: false }
    }

    pub fn zeros(len: usize) -> VecBuffer {
        VecBuffer::new(vec![0.0; len])
    }

    /// A buffer whose storage is gone; every access reports `InvalidBuffer`.
    pub fn released() -> VecBuffer {
        VecBuffer { frames: Vec::new(), released: true }
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.frames
    }
}

impl From<Vec<f64>> for VecBuffer {
    fn from(frames: Vec<f64>) -> Self {
        VecBuffer::new(frames)
    }
}

impl BufferAdaptor for VecBuffer {
    fn exists(&self) -> bool {
        !self.released
    }

    fn num_frames(&self) -> usize {
        self.frames.len()
    }

    fn samples(&self) -> &[f64] {
        &self.frames
    }

    fn samples_mut(&mut self) -> &mut [f64] {
        &mut self.frames
    }

    fn resize(&mut self, frames: usize) -> Result<()> {
        if self.released {
            return Err(KnnError::InvalidBuffer);
        }
        self.frames.resize(frames, 0.0);
        Ok(())
    }
}

/// Checks that a buffer was supplied and refers to live storage.
pub fn check_buffer(buffer: Option<&dyn BufferAdaptor>) -> Result<&dyn BufferAdaptor> {
    let buffer = buffer.ok_or(KnnError::NoBuffer)?;
    if !buffer.exists() {
        return Err(KnnError::InvalidBuffer);
    }
    Ok(buffer)
}

/// Reads the first `dims` frames of an input buffer.
///
/// # Errors
///
/// `NoBuffer`, `InvalidBuffer`, `EmptyBuffer` (no frames), `WrongPointSize`
/// (fewer than `dims` frames).
pub fn read_point(buffer: Option<&dyn BufferAdaptor>, dims: usize) -> Result<Vec<f64>> {
    let buffer = check_buffer(buffer)?;
    if buffer.num_frames() == 0 {
        return Err(KnnError::EmptyBuffer);
    }
    if buffer.num_frames() < dims {
        return Err(KnnError::WrongPointSize { expected: dims, found: buffer.num_frames() });
    }
    Ok(buffer.samples()[..dims].to_vec())
}

#[cfg(test)]
mod buffer_test {
    use super::*;

    #[test]
    fn test_read_point_takes_leading_frames() {
        let buf = VecBuffer::new(vec![1.0, 2.0, 3.0]);
        assert_eq!(read_point(Some(&buf), 2).unwrap(), vec![1.0, 2.0]);
        assert_eq!(read_point(Some(&buf), 3).unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_read_point_errors() {
        assert!(matches!(read_point(None, 2), Err(KnnError::NoBuffer)));
        assert!(matches!(read_point(Some(&VecBuffer::released()), 2), Err(KnnError::InvalidBuffer)));
        assert!(matches!(read_point(Some(&VecBuffer::default()), 2), Err(KnnError::EmptyBuffer)));
        assert!(matches!(
            read_point(Some(&VecBuffer::new(vec![1.0])), 2),
            Err(KnnError::WrongPointSize { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_resize() {
        let mut buf = VecBuffer::new(vec![4.0]);
        buf.resize(3).unwrap();
        assert_eq!(buf.samples(), &[4.0, 0.0, 0.0]);

        assert!(matches!(VecBuffer::released().resize(1), Err(KnnError::InvalidBuffer)));
    }
}
