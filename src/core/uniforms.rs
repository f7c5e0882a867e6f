// src/core/uniforms.rs
// Named uniform values and their packing into WGSL uniform-buffer layout

use glam::{Mat4, Vec2, Vec3, Vec4};
use std::collections::BTreeMap;

use crate::error::{RenderError, RenderResult};

/// Declared type of a program uniform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    UInt,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    Vec4Array(u32),
    Mat4Array(u32),
}

impl UniformKind {
    /// Alignment in the uniform address space
    pub fn align(self) -> usize {
        match self {
            UniformKind::Float | UniformKind::UInt => 4,
            UniformKind::Vec2 => 8,
            _ => 16,
        }
    }

    pub fn size(self) -> usize {
        match self {
            UniformKind::Float | UniformKind::UInt => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec3 => 12,
            UniformKind::Vec4 => 16,
            UniformKind::Mat4 => 64,
            UniformKind::Vec4Array(n) => 16 * n as usize,
            UniformKind::Mat4Array(n) => 64 * n as usize,
        }
    }
}

/// A value set on a program by name
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    UInt(u32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    Vec4Array(Vec<Vec4>),
    Mat4Array(Vec<Mat4>),
}

impl UniformValue {
    /// Arrays may be shorter than the declared length; the tail packs as zero.
    pub fn fits(&self, kind: UniformKind) -> bool {
        match (self, kind) {
            (UniformValue::Float(_), UniformKind::Float)
            | (UniformValue::UInt(_), UniformKind::UInt)
            | (UniformValue::Vec2(_), UniformKind::Vec2)
            | (UniformValue::Vec3(_), UniformKind::Vec3)
            | (UniformValue::Vec4(_), UniformKind::Vec4)
            | (UniformValue::Mat4(_), UniformKind::Mat4) => true,
            (UniformValue::Vec4Array(v), UniformKind::Vec4Array(n)) => v.len() <= n as usize,
            (UniformValue::Mat4Array(v), UniformKind::Mat4Array(n)) => v.len() <= n as usize,
            _ => false,
        }
    }

    fn write_into(&self, dst: &mut [u8]) {
        let floats: Vec<f32> = match self {
            UniformValue::Float(v) => vec![*v],
            UniformValue::UInt(v) => {
                dst[..4].copy_from_slice(&v.to_ne_bytes());
                return;
            }
            UniformValue::Vec2(v) => v.to_array().to_vec(),
            UniformValue::Vec3(v) => v.to_array().to_vec(),
            UniformValue::Vec4(v) => v.to_array().to_vec(),
            UniformValue::Mat4(m) => m.to_cols_array().to_vec(),
            UniformValue::Vec4Array(vs) => vs.iter().flat_map(|v| v.to_array()).collect(),
            UniformValue::Mat4Array(ms) => ms.iter().flat_map(|m| m.to_cols_array()).collect(),
        };
        let bytes: &[u8] = bytemuck::cast_slice(&floats);
        dst[..bytes.len()].copy_from_slice(bytes);
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<u32> for UniformValue {
    fn from(v: u32) -> Self {
        UniformValue::UInt(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        UniformValue::Mat4(v)
    }
}

impl From<Vec<Vec4>> for UniformValue {
    fn from(v: Vec<Vec4>) -> Self {
        UniformValue::Vec4Array(v)
    }
}

impl From<Vec<Mat4>> for UniformValue {
    fn from(v: Vec<Mat4>) -> Self {
        UniformValue::Mat4Array(v)
    }
}

/// Current uniform values of one program, keyed by name
pub type UniformBlock = BTreeMap<&'static str, UniformValue>;

/// A uniform declared by a program, in WGSL struct member order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: &'static str,
    pub kind: UniformKind,
}

impl UniformDecl {
    pub const fn new(name: &'static str, kind: UniformKind) -> Self {
        Self { name, kind }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct LayoutEntry {
    name: &'static str,
    kind: UniformKind,
    offset: usize,
}

/// Byte layout of a program's `Uniforms` struct
#[derive(Debug, Clone, PartialEq)]
pub struct UniformLayout {
    entries: Vec<LayoutEntry>,
    size: usize,
}

fn align_to(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

impl UniformLayout {
    pub fn new(decls: &[UniformDecl]) -> Self {
        let mut offset = 0;
        let mut entries = Vec::with_capacity(decls.len());
        for decl in decls {
            offset = align_to(offset, decl.kind.align());
            entries.push(LayoutEntry {
                name: decl.name,
                kind: decl.kind,
                offset,
            });
            offset += decl.kind.size();
        }
        // Keep the buffer non-empty and a whole number of vec4s
        let size = align_to(offset.max(16), 16);
        Self { entries, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.offset)
    }

    pub fn kind_of(&self, name: &str) -> Option<UniformKind> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.kind)
    }

    /// Pack `block` into a zero-initialised buffer.
    ///
    /// Declared uniforms without a value stay zero; values for undeclared
    /// names are ignored.
    pub fn pack(&self, program: &str, block: &UniformBlock) -> RenderResult<Vec<u8>> {
        let mut bytes = vec![0u8; self.size];
        for entry in &self.entries {
            let Some(value) = block.get(entry.name) else {
                continue;
            };
            if !value.fits(entry.kind) {
                return Err(RenderError::render(format!(
                    "uniform '{}' of program '{}' expects {:?}, got {:?}",
                    entry.name, program, entry.kind, value
                )));
            }
            let end = entry.offset + entry.kind.size();
            value.write_into(&mut bytes[entry.offset..end]);
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_followed_by_scalar_shares_a_slot() {
        let layout = UniformLayout::new(&[
            UniformDecl::new("a", UniformKind::Vec3),
            UniformDecl::new("b", UniformKind::Float),
            UniformDecl::new("c", UniformKind::Vec2),
            UniformDecl::new("d", UniformKind::Mat4),
        ]);
        assert_eq!(layout.offset_of("a"), Some(0));
        assert_eq!(layout.offset_of("b"), Some(12));
        assert_eq!(layout.offset_of("c"), Some(16));
        assert_eq!(layout.offset_of("d"), Some(32));
        assert_eq!(layout.size(), 96);
    }

    #[test]
    fn arrays_pad_short_values_with_zero() {
        let layout = UniformLayout::new(&[
            UniformDecl::new("count", UniformKind::UInt),
            UniformDecl::new("items", UniformKind::Vec4Array(3)),
        ]);
        assert_eq!(layout.offset_of("items"), Some(16));
        assert_eq!(layout.size(), 64);

        let mut block = UniformBlock::new();
        block.insert("count", UniformValue::UInt(1));
        block.insert("items", UniformValue::Vec4Array(vec![Vec4::splat(2.0)]));
        let bytes = layout.pack("test", &block).unwrap();
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(u32::from_ne_bytes(bytes[0..4].try_into().unwrap()), 1);
        assert_eq!(&floats[4..8], &[2.0; 4]);
        assert!(floats[8..].iter().all(|f| *f == 0.0));
    }

    #[test]
    fn mismatched_kind_is_rejected() {
        let layout = UniformLayout::new(&[UniformDecl::new("m", UniformKind::Mat4)]);
        let mut block = UniformBlock::new();
        block.insert("m", UniformValue::Float(1.0));
        assert!(layout.pack("test", &block).is_err());
    }
}
