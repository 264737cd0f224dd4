//! Byte-level builders for OpenFlight test streams.

use super::opcodes;
use byteorder::{BigEndian, WriteBytesExt};

pub fn u16be(v: u16) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

pub fn i16be(v: i16) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

pub fn u32be(v: u32) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

pub fn i32be(v: i32) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

pub fn f32be(v: f32) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

pub fn f64be(v: f64) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

/// `s` zero-padded (or truncated) to exactly `n` bytes.
pub fn fixed_str(s: &str, n: usize) -> Vec<u8> {
    let mut out = s.as_bytes().to_vec();
    out.truncate(n);
    out.resize(n, 0);
    out
}

/// One framed record: opcode, total length including the 4-byte header.
pub fn rec(opcode: u16, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + body.len());
    out.write_u16::<BigEndian>(opcode).unwrap();
    out.write_u16::<BigEndian>((body.len() + 4) as u16).unwrap();
    out.extend_from_slice(body);
    out
}

pub fn push() -> Vec<u8> {
    rec(opcodes::PUSH_LEVEL, &[])
}

pub fn pop() -> Vec<u8> {
    rec(opcodes::POP_LEVEL, &[])
}

/// Header record with node id "hdr" and no legacy unit factor.
pub fn header_record(version: u32, units: u8) -> Vec<u8> {
    header_record_with_mult_div(version, units, 0)
}

pub fn header_record_with_mult_div(version: u32, units: u8, mult_div: i16) -> Vec<u8> {
    let mut body = fixed_str("hdr", 8);
    body.extend(u32be(version));
    body.extend(u32be(0)); // revision
    body.extend(fixed_str("", 32)); // revision time
    body.extend([0u8; 8]); // next bead ids
    body.extend(i16be(mult_div));
    body.push(units);
    body.push(0); // textured-white default
    body.extend(u32be(0)); // flags
    rec(opcodes::HEADER, &body)
}

pub fn vertex_list(offsets: &[u32]) -> Vec<u8> {
    let body: Vec<u8> = offsets.iter().flat_map(|o| o.to_be_bytes()).collect();
    rec(opcodes::VERTEX_LIST, &body)
}

/// Accumulates framed vertex records behind the 8 bytes of padding that
/// stand in for the palette record header, so the returned offsets are
/// the byte offsets geometry actually stores.
pub struct VertexPaletteBuilder {
    data: Vec<u8>,
}

impl VertexPaletteBuilder {
    pub fn new() -> Self {
        Self { data: vec![0u8; 8] }
    }

    fn add(
        &mut self,
        opcode: u16,
        position: [f64; 3],
        normal: Option<[f32; 3]>,
        uv: Option<[f32; 2]>,
        packed: u32,
        use_packed: bool,
    ) -> u32 {
        let offset = self.data.len() as u32;
        let length = 40 + normal.map_or(0, |_| 12) + uv.map_or(0, |_| 8);
        self.data.extend(u16be(opcode));
        self.data.extend(u16be(length));
        self.data.extend(u16be(0)); // color name
        self.data
            .extend(u16be(if use_packed { 0x1000 } else { 0 })); // flags
        for c in position {
            self.data.extend(f64be(c));
        }
        if let Some(n) = normal {
            for c in n {
                self.data.extend(f32be(c));
            }
        }
        if let Some(t) = uv {
            for c in t {
                self.data.extend(f32be(c));
            }
        }
        self.data.extend(u32be(packed));
        self.data.extend(i32be(0)); // color index
        offset
    }

    pub fn add_vertex_c(&mut self, position: [f64; 3], packed: u32, use_packed: bool) -> u32 {
        self.add(opcodes::VERTEX_C, position, None, None, packed, use_packed)
    }

    pub fn add_vertex_cn(
        &mut self,
        position: [f64; 3],
        normal: [f32; 3],
        packed: u32,
        use_packed: bool,
    ) -> u32 {
        self.add(
            opcodes::VERTEX_CN,
            position,
            Some(normal),
            None,
            packed,
            use_packed,
        )
    }

    pub fn add_vertex_cnt(
        &mut self,
        position: [f64; 3],
        normal: [f32; 3],
        uv: [f32; 2],
        packed: u32,
        use_packed: bool,
    ) -> u32 {
        self.add(
            opcodes::VERTEX_CNT,
            position,
            Some(normal),
            Some(uv),
            packed,
            use_packed,
        )
    }

    pub fn add_vertex_ct(
        &mut self,
        position: [f64; 3],
        uv: [f32; 2],
        packed: u32,
        use_packed: bool,
    ) -> u32 {
        self.add(
            opcodes::VERTEX_CT,
            position,
            None,
            Some(uv),
            packed,
            use_packed,
        )
    }

    /// The accumulated pool buffer, as [`super::pools::VertexPool`]
    /// stores it.
    pub fn pool_bytes(&self) -> Vec<u8> {
        self.data.clone()
    }

    /// The vertex palette record followed by its out-of-band entry
    /// bytes, ready to splice into a record stream.
    pub fn records(&self) -> Vec<u8> {
        let mut out = u16be(opcodes::VERTEX_PALETTE);
        out.extend(u16be(8));
        out.extend(u32be(self.data.len() as u32));
        out.extend_from_slice(&self.data[8..]);
        out
    }
}

/// Face record with every field at its quiet default: flat shading, no
/// texture, no material, opaque, palette color -1.
pub struct FaceBuilder {
    id: String,
    draw_mode: u8,
    textured_white: bool,
    color_name: i16,
    template: u8,
    texture: i16,
    material: i16,
    transparency: u16,
    flags: u32,
    light_mode: u8,
    packed: u32,
    color_index: i32,
}

impl FaceBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            draw_mode: 1,
            textured_white: false,
            color_name: -1,
            template: 0,
            texture: -1,
            material: -1,
            transparency: 0,
            flags: 0,
            light_mode: 0,
            packed: 0xffff_ffff,
            color_index: -1,
        }
    }

    pub fn draw_mode(mut self, v: u8) -> Self {
        self.draw_mode = v;
        self
    }

    pub fn template(mut self, v: u8) -> Self {
        self.template = v;
        self
    }

    pub fn light_mode(mut self, v: u8) -> Self {
        self.light_mode = v;
        self
    }

    pub fn packed_color(mut self, abgr: u32) -> Self {
        self.packed = abgr;
        self.flags |= 0x1000_0000;
        self
    }

    pub fn color_index(mut self, v: i32) -> Self {
        self.color_index = v;
        self
    }

    pub fn color_name(mut self, v: i16) -> Self {
        self.color_name = v;
        self
    }

    pub fn material(mut self, v: i16) -> Self {
        self.material = v;
        self
    }

    pub fn texture(mut self, v: i16) -> Self {
        self.texture = v;
        self
    }

    pub fn transparency(mut self, v: u16) -> Self {
        self.transparency = v;
        self
    }

    pub fn flags(mut self, v: u32) -> Self {
        self.flags |= v;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut body = fixed_str(&self.id, 8);
        body.extend(i32be(0)); // ir color
        body.extend(i16be(0)); // priority
        body.push(self.draw_mode);
        body.push(self.textured_white as u8);
        body.extend(i16be(self.color_name));
        body.extend(i16be(-1)); // alternate color name
        body.push(0); // reserved
        body.push(self.template);
        body.extend(i16be(-1)); // detail texture
        body.extend(i16be(self.texture));
        body.extend(i16be(self.material));
        body.extend(i16be(0)); // surface material code
        body.extend(i16be(0)); // feature id
        body.extend(i32be(0)); // ir material
        body.extend(u16be(self.transparency));
        body.push(0); // lod generation control
        body.push(0); // line style
        body.extend(u32be(self.flags));
        body.push(self.light_mode);
        body.extend([0u8; 7]);
        body.extend(u32be(self.packed));
        body.extend(u32be(self.packed)); // alternate packed color
        body.extend(i16be(-1)); // texture mapping
        body.extend([0u8; 2]);
        body.extend(i32be(self.color_index));
        body.extend(i32be(-1)); // alternate color index
        body.extend([0u8; 2]);
        body.extend(i16be(-1)); // shader
        rec(opcodes::FACE, &body)
    }
}
