//! Byte-stream builders used by the 3D Studio tests.

use super::chunk::{tags, HEADER_SIZE};
use byteorder::{LittleEndian, WriteBytesExt};

pub fn u16le(v: u16) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

pub fn i16le(v: i16) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

pub fn u32le(v: u32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

pub fn f32le(v: f32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

pub fn vec3le(v: [f32; 3]) -> Vec<u8> {
    [f32le(v[0]), f32le(v[1]), f32le(v[2])].concat()
}

pub fn cstr(s: &str) -> Vec<u8> {
    let mut out = s.as_bytes().to_vec();
    out.push(0);
    out
}

/// A leaf chunk: header plus raw body.
pub fn chunk(tag: u16, body: &[u8]) -> Vec<u8> {
    chunk_with(tag, body, &[])
}

/// A container chunk: header, leading fields, then child chunks.
pub fn chunk_with(tag: u16, lead: &[u8], children: &[Vec<u8>]) -> Vec<u8> {
    let body_len: usize = lead.len() + children.iter().map(Vec::len).sum::<usize>();
    let mut out = Vec::with_capacity(HEADER_SIZE as usize + body_len);
    out.write_u16::<LittleEndian>(tag).unwrap();
    out.write_u32::<LittleEndian>(HEADER_SIZE + body_len as u32)
        .unwrap();
    out.extend_from_slice(lead);
    for child in children {
        out.extend_from_slice(child);
    }
    out
}

pub fn top_level(children: &[Vec<u8>]) -> Vec<u8> {
    chunk_with(tags::M3DMAGIC, &[], children)
}

pub fn named_object(name: &str, children: &[Vec<u8>]) -> Vec<u8> {
    chunk_with(tags::NAMED_OBJECT, &cstr(name), children)
}

pub fn tri_object(children: &[Vec<u8>]) -> Vec<u8> {
    chunk_with(tags::N_TRI_OBJECT, &[], children)
}

pub fn point_array(points: &[[f32; 3]]) -> Vec<u8> {
    let mut body = u16le(points.len() as u16);
    for p in points {
        body.extend(vec3le(*p));
    }
    chunk(tags::POINT_ARRAY, &body)
}

pub fn tex_verts(uvs: &[[f32; 2]]) -> Vec<u8> {
    let mut body = u16le(uvs.len() as u16);
    for uv in uvs {
        body.extend(f32le(uv[0]));
        body.extend(f32le(uv[1]));
    }
    chunk(tags::TEX_VERTS, &body)
}

/// Face array with zero face flags, plus optional subchunks.
pub fn face_array(faces: &[[u16; 3]], subchunks: &[Vec<u8>]) -> Vec<u8> {
    let mut lead = u16le(faces.len() as u16);
    for f in faces {
        lead.extend(u16le(f[0]));
        lead.extend(u16le(f[1]));
        lead.extend(u16le(f[2]));
        lead.extend(u16le(0));
    }
    chunk_with(tags::FACE_ARRAY, &lead, subchunks)
}

/// Track header with the given key count and no flags.
pub fn track_header(keys: u32) -> Vec<u8> {
    [u16le(0), u32le(0), u32le(0), u32le(keys)].concat()
}

/// Key header without spline parameters.
pub fn key_header(frame: i32) -> Vec<u8> {
    [frame.to_le_bytes().to_vec(), u16le(0)].concat()
}
