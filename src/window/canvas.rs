//! Shared-memory canvases
//!
//! The server allocates a pixel buffer for every top-level, dialog and
//! menu-frame window and hands the client a segment handle. The client maps
//! the segment and draws into it. Dropping a [`Canvas`] unmaps it.

use crate::error::{ClientError, ClientResult};
use crate::protocol::{CanvasInfo, Rect};
use memmap2::{MmapMut, MmapOptions};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::shm_open;
use nix::sys::stat::Mode;
use std::fs::File;

/// Bytes per pixel (ARGB8888)
pub const BYTES_PER_PIXEL: usize = 4;

/// A mapped segment
pub trait Segment: Send {
    fn bytes(&self) -> &[u8];
    fn bytes_mut(&mut self) -> &mut [u8];
}

/// Attaches segments by handle
pub trait SharedMemory: Send + Sync {
    fn attach(&self, info: &CanvasInfo) -> ClientResult<Box<dyn Segment>>;
}

/// POSIX shared memory: handle `n` names the object `/<prefix><n>`
pub struct PosixShm {
    prefix: String,
}

impl PosixShm {
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        PosixShm {
            prefix: prefix.into(),
        }
    }

    fn name(&self, handle: u32) -> String {
        format!("/{}{}", self.prefix, handle)
    }
}

struct MappedSegment {
    map: MmapMut,
}

impl Segment for MappedSegment {
    fn bytes(&self) -> &[u8] {
        &self.map
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }
}

impl SharedMemory for PosixShm {
    fn attach(&self, info: &CanvasInfo) -> ClientResult<Box<dyn Segment>> {
        if info.size == 0 {
            return Err(ClientError::Shm(Errno::EINVAL));
        }
        let name = self.name(info.handle);
        let fd = shm_open(name.as_str(), OFlag::O_RDWR, Mode::empty())?;
        let file = File::from(fd);
        // SAFETY: the segment is shared with the server, which only writes
        // to it while the client is not drawing (between resize phases).
        let map = unsafe { MmapOptions::new().len(info.size as usize).map_mut(&file)? };
        log::debug!("Attached canvas {} ({} bytes)", name, info.size);
        Ok(Box::new(MappedSegment { map }))
    }
}

/// A window's pixel buffer and the drawing context bound to it
pub struct Canvas {
    info: CanvasInfo,
    width: u32,
    height: u32,
    segment: Box<dyn Segment>,
}

impl Canvas {
    /// Map the segment described by `info` for a `width` x `height` window
    pub fn attach(
        shm: &dyn SharedMemory,
        info: &CanvasInfo,
        width: u32,
        height: u32,
    ) -> ClientResult<Canvas> {
        let segment = shm.attach(info)?;
        let mut canvas = Canvas {
            info: *info,
            width: 0,
            height: 0,
            segment,
        };
        canvas.set_extent(width, height);
        Ok(canvas)
    }

    pub fn handle(&self) -> u32 {
        self.info.handle
    }

    pub fn info(&self) -> &CanvasInfo {
        &self.info
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.info.stride as usize
    }

    /// Update the drawable extent after a resize that kept the segment.
    /// The extent is clamped to what the segment can hold.
    pub fn set_extent(&mut self, width: u32, height: u32) {
        let stride = self.stride().max(1);
        let len = self.segment.bytes().len();
        let max_width = (stride / BYTES_PER_PIXEL) as u32;
        let max_height = (len / stride) as u32;
        self.width = width.min(max_width);
        self.height = height.min(max_height);
    }

    /// Adopt new geometry for the same segment
    pub fn reshape(&mut self, info: &CanvasInfo, width: u32, height: u32) {
        self.info.stride = info.stride;
        self.info.size = info.size;
        self.set_extent(width, height);
    }

    pub fn bytes(&self) -> &[u8] {
        self.segment.bytes()
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, argb: u32) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = y as usize * self.stride() + x as usize * BYTES_PER_PIXEL;
        let bytes = self.segment.bytes_mut();
        if let Some(px) = bytes.get_mut(offset..offset + BYTES_PER_PIXEL) {
            px.copy_from_slice(&argb.to_ne_bytes());
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.stride() + x as usize * BYTES_PER_PIXEL;
        let px = self.segment.bytes().get(offset..offset + BYTES_PER_PIXEL)?;
        Some(u32::from_ne_bytes([px[0], px[1], px[2], px[3]]))
    }

    /// Fill `rect`, clipped to the canvas
    pub fn fill_rect(&mut self, rect: Rect, argb: u32) {
        let x0 = rect.x.max(0) as u32;
        let y0 = rect.y.max(0) as u32;
        let x1 = (rect.right().max(0) as u32).min(self.width);
        let y1 = (rect.bottom().max(0) as u32).min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        let stride = self.stride();
        let pixel = argb.to_ne_bytes();
        let bytes = self.segment.bytes_mut();
        for y in y0..y1 {
            let row = y as usize * stride;
            let start = row + x0 as usize * BYTES_PER_PIXEL;
            let end = row + x1 as usize * BYTES_PER_PIXEL;
            if let Some(span) = bytes.get_mut(start..end) {
                for px in span.chunks_exact_mut(BYTES_PER_PIXEL) {
                    px.copy_from_slice(&pixel);
                }
            }
        }
    }
}

impl std::fmt::Debug for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canvas")
            .field("handle", &self.info.handle)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.info.stride)
            .finish()
    }
}

/// Heap-backed segments for running without a server
#[derive(Debug, Default)]
pub struct HeapShm;

struct HeapSegment(Vec<u8>);

impl Segment for HeapSegment {
    fn bytes(&self) -> &[u8] {
        &self.0
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl SharedMemory for HeapShm {
    fn attach(&self, info: &CanvasInfo) -> ClientResult<Box<dyn Segment>> {
        Ok(Box::new(HeapSegment(vec![0u8; info.size as usize])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas(width: u32, height: u32) -> Canvas {
        let info = CanvasInfo {
            handle: 1,
            size: width * height * 4,
            stride: width * 4,
        };
        Canvas::attach(&HeapShm, &info, width, height).unwrap()
    }

    #[test]
    fn test_fill_rect_is_clipped() {
        let mut c = canvas(10, 10);
        c.fill_rect(Rect::new(-5, 8, 20, 20), 0xff00ff00);
        assert_eq!(c.pixel(0, 8), Some(0xff00ff00));
        assert_eq!(c.pixel(9, 9), Some(0xff00ff00));
        assert_eq!(c.pixel(0, 7), Some(0));
        assert_eq!(c.pixel(10, 9), None);
    }

    #[test]
    fn test_fill_rect_with_huge_extent() {
        let mut c = canvas(10, 10);
        c.fill_rect(Rect::new(2, 2, u32::MAX, u32::MAX), 0xffff0000);
        assert_eq!(c.pixel(1, 1), Some(0));
        assert_eq!(c.pixel(2, 2), Some(0xffff0000));
        assert_eq!(c.pixel(9, 9), Some(0xffff0000));
    }

    #[test]
    fn test_extent_clamped_to_segment() {
        let mut c = canvas(10, 10);
        c.set_extent(50, 50);
        assert_eq!((c.width(), c.height()), (10, 10));
        c.set_extent(4, 3);
        assert_eq!((c.width(), c.height()), (4, 3));
        c.put_pixel(5, 0, 1);
        assert_eq!(c.pixel(5, 0), None);
    }

    #[test]
    fn test_missing_posix_segment_fails() {
        let shm = PosixShm::new("wsclient-test-missing-");
        let info = CanvasInfo {
            handle: 0xfffffff,
            size: 4096,
            stride: 64,
        };
        assert!(shm.attach(&info).is_err());
    }
}
