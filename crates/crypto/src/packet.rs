//! Length-framed packet reassembly for the decrypt path.
//!
//! The sender frames every plaintext block as `len(u32 BE) | bytes` and
//! encrypts the frame. Because the cipher withholds partial blocks, one
//! record's ciphertext rarely decrypts to exactly one frame: the receiver
//! accumulates decrypted bytes here and takes frames back out whole. One
//! frame is taken per received record, matching the one-block-per-record
//! cadence of the sender; the drain at end of file takes whatever remains.

/// Byte length of the packet-length prefix.
pub const CRYPTO_LEN_SIZE: usize = 4;

/// Accumulates decrypted bytes and yields whole length-framed packets.
#[derive(Debug, Default)]
pub struct PacketBuffer {
    buf: Vec<u8>,
    packet_len: usize,
}

impl PacketBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly decrypted bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Mutable spare-buffer access for in-place decryption.
    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }

    /// Bytes currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Takes the next whole packet's payload, if one is available.
    ///
    /// The length prefix is read lazily and cached, so a prefix split
    /// across calls to [`Self::extend`] is handled transparently.
    pub fn take_packet(&mut self) -> Option<Vec<u8>> {
        if self.packet_len == 0 && self.buf.len() >= CRYPTO_LEN_SIZE {
            let declared =
                u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
            self.packet_len = declared + CRYPTO_LEN_SIZE;
        }
        if self.packet_len == 0 || self.buf.len() < self.packet_len {
            return None;
        }

        let payload = self.buf[CRYPTO_LEN_SIZE..self.packet_len].to_vec();
        self.buf.drain(..self.packet_len);
        self.packet_len = 0;
        Some(payload)
    }

    /// Discards all buffered state.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.packet_len = 0;
    }
}
