/// Hands out a buffered body in caller-sized pieces
///
/// The window is `[offset, end)`. The offset only ever moves forward and
/// never passes `end`.
#[derive(Debug)]
pub struct DeliveryCursor {
    body: Vec<u8>,
    offset: usize,
    end: usize
}

impl DeliveryCursor {
    /// Delivers the whole body
    pub fn new(body: Vec<u8>) -> DeliveryCursor {
        let end = body.len();
        DeliveryCursor { body: body, offset: 0, end: end }
    }

    /// Delivers `body[start ..= last]`, clipped to the body
    pub fn window(body: Vec<u8>, start: usize, last: usize) -> DeliveryCursor {
        let end = last.saturating_add(1).min(body.len());
        DeliveryCursor { body: body, offset: start.min(end), end: end }
    }

    /// Copies up to `sink.len()` bytes into `sink`.
    ///
    /// Returns how many bytes were copied and whether that was the last of
    /// them.
    pub fn read(&mut self, sink: &mut [u8]) -> (usize, bool) {
        let count = sink.len().min(self.end - self.offset);
        sink[.. count].copy_from_slice(&self.body[self.offset .. self.offset + count]);
        self.offset += count;

        (count, self.offset == self.end)
    }

    /// Bytes left to deliver
    #[inline]
    pub fn remaining(&self) -> usize {
        self.end - self.offset
    }
}
