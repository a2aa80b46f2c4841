//! Numbered test packets: a little-endian `u32` id followed by filler bytes.

pub const PACKET_ID_LEN: usize = 4;

/// Packet `id`, padded with the low byte of the id up to `len` bytes.
pub fn numbered_packet(id: u32, len: usize) -> Vec<u8> {
    let mut packet = id.to_le_bytes().to_vec();
    packet.resize(len.max(PACKET_ID_LEN), id as u8);
    packet
}

/// The id carried by a numbered packet, if it is long enough and the filler
/// is intact.
pub fn packet_id(packet: &[u8]) -> Option<u32> {
    let (head, filler) = packet.split_first_chunk::<PACKET_ID_LEN>()?;
    let id = u32::from_le_bytes(*head);
    filler.iter().all(|&b| b == id as u8).then_some(id)
}
