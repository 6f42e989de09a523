// XDR (RFC 4506) encoding for the RPC calls the VXI-11 transport makes. Everything is big-endian
// and padded to four bytes.

use std::io::{self, Cursor, Read};

use byteorder::{BigEndian, WriteBytesExt, ReadBytesExt};

#[derive(Default)]
pub struct Packer {
	buff: Vec<u8>,
}

pub struct Unpacker {
	cursor: Cursor<Vec<u8>>,
}

impl Packer {

	pub fn new() -> Self { Packer::default() }

	pub fn as_bytes(&self) -> &[u8] { &self.buff }

	// These only ever add multiples of four bytes, so alignment is preserved
	pub fn pack_u32(&mut self, x:u32) -> io::Result<()> { self.buff.write_u32::<BigEndian>(x) }
	pub fn pack_i32(&mut self, x:i32) -> io::Result<()> { self.buff.write_i32::<BigEndian>(x) }

	pub fn pack_bool(&mut self, b:bool) -> io::Result<()> { self.pack_i32(if b { 1 } else { 0 }) }

	pub fn pack_opaque(&mut self, data:&[u8]) -> io::Result<()> {
		self.pack_u32(data.len() as u32)?;
		self.buff.extend_from_slice(data);
		while self.buff.len() % 4 != 0 { self.buff.push(0); }
		Ok(())
	}

	pub fn pack_string(&mut self, s:&str) -> io::Result<()> { self.pack_opaque(s.as_bytes()) }
}

impl Unpacker {

	pub fn new(data:Vec<u8>) -> Self { Unpacker { cursor: Cursor::new(data) } }

	pub fn remaining(&self) -> usize {
		self.cursor.get_ref().len().saturating_sub(self.cursor.position() as usize)
	}

	pub fn unpack_u32(&mut self) -> io::Result<u32> { self.cursor.read_u32::<BigEndian>() }
	pub fn unpack_i32(&mut self) -> io::Result<i32> { self.cursor.read_i32::<BigEndian>() }

	pub fn unpack_opaque(&mut self) -> io::Result<Vec<u8>> {
		let len = self.unpack_u32()? as usize;
		if len > self.remaining() {
			return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "opaque length exceeds the reply"));
		}

		let mut data = vec![0u8; len];
		self.cursor.read_exact(&mut data)?;

		let pad = (4 - len % 4) % 4;
		self.cursor.set_position(self.cursor.position() + pad as u64);
		Ok(data)
	}
}
