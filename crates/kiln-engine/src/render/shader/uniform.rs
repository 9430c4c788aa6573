//! Uniform values and their WGSL uniform-buffer encoding.

use std::fmt;

use crate::coords::Color;

/// Scalar component class of a uniform.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScalarType {
    Float,
    Sint,
    Uint,
}

impl ScalarType {
    fn wgsl(self) -> &'static str {
        match self {
            ScalarType::Float => "f32",
            ScalarType::Sint => "i32",
            ScalarType::Uint => "u32",
        }
    }
}

/// Declared type of a uniform-buffer member, as reflected from the shader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniformKind {
    Scalar(ScalarType),
    Vector(ScalarType, u8),
    /// `f32` matrix; columns are `rows` floats padded to 8 or 16 bytes.
    Matrix { columns: u8, rows: u8 },
    Array {
        element: Box<UniformKind>,
        len: u32,
        stride: u32,
    },
}

impl UniformKind {
    fn scalar_type(&self) -> ScalarType {
        match self {
            UniformKind::Scalar(s) | UniformKind::Vector(s, _) => *s,
            UniformKind::Matrix { .. } => ScalarType::Float,
            UniformKind::Array { element, .. } => element.scalar_type(),
        }
    }

    fn component_count(&self) -> usize {
        match self {
            UniformKind::Scalar(_) => 1,
            UniformKind::Vector(_, n) => *n as usize,
            UniformKind::Matrix { columns, rows } => *columns as usize * *rows as usize,
            UniformKind::Array { element, len, .. } => element.component_count() * *len as usize,
        }
    }

    /// Byte offset of every 32-bit component, relative to the member start.
    fn word_offsets(&self, base: u32, out: &mut Vec<u32>) {
        match self {
            UniformKind::Scalar(_) => out.push(base),
            UniformKind::Vector(_, n) => out.extend((0..*n as u32).map(|i| base + i * 4)),
            UniformKind::Matrix { columns, rows } => {
                let column_stride = if *rows == 2 { 8 } else { 16 };
                for c in 0..*columns as u32 {
                    for r in 0..*rows as u32 {
                        out.push(base + c * column_stride + r * 4);
                    }
                }
            }
            UniformKind::Array { element, len, stride } => {
                for i in 0..*len {
                    element.word_offsets(base + i * stride, out);
                }
            }
        }
    }
}

impl fmt::Display for UniformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformKind::Scalar(s) => f.write_str(s.wgsl()),
            UniformKind::Vector(s, n) => write!(f, "vec{n}<{}>", s.wgsl()),
            UniformKind::Matrix { columns, rows } => write!(f, "mat{columns}x{rows}<f32>"),
            UniformKind::Array { element, len, .. } => write!(f, "array<{element}, {len}>"),
        }
    }
}

/// A value accepted by [`super::ShaderProgram::set_uniform`].
///
/// Matrices are column-major. Arrays may be shorter than the declared
/// uniform array as long as they hold whole elements.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Uint(u32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat3([f32; 9]),
    Mat4([f32; 16]),
    FloatArray(Vec<f32>),
    IntArray(Vec<i32>),
}

impl UniformValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            UniformValue::Float(_) => "float",
            UniformValue::Int(_) => "int",
            UniformValue::Uint(_) => "uint",
            UniformValue::Vec2(_) => "vec2",
            UniformValue::Vec3(_) => "vec3",
            UniformValue::Vec4(_) => "vec4",
            UniformValue::Mat3(_) => "mat3",
            UniformValue::Mat4(_) => "mat4",
            UniformValue::FloatArray(_) => "float array",
            UniformValue::IntArray(_) => "int array",
        }
    }

    /// The value as a non-negative integer, for sampler uniforms.
    pub(crate) fn as_unit(&self) -> Option<u32> {
        match *self {
            UniformValue::Int(v) => u32::try_from(v).ok(),
            UniformValue::Uint(v) => Some(v),
            _ => None,
        }
    }

    fn scalar_type(&self) -> ScalarType {
        match self {
            UniformValue::Int(_) | UniformValue::IntArray(_) => ScalarType::Sint,
            UniformValue::Uint(_) => ScalarType::Uint,
            _ => ScalarType::Float,
        }
    }

    fn words(&self) -> Vec<u32> {
        fn floats(v: &[f32]) -> Vec<u32> {
            v.iter().map(|f| f.to_bits()).collect()
        }
        match self {
            UniformValue::Float(v) => vec![v.to_bits()],
            UniformValue::Int(v) => vec![*v as u32],
            UniformValue::Uint(v) => vec![*v],
            UniformValue::Vec2(v) => floats(v),
            UniformValue::Vec3(v) => floats(v),
            UniformValue::Vec4(v) => floats(v),
            UniformValue::Mat3(v) => floats(v),
            UniformValue::Mat4(v) => floats(v),
            UniformValue::FloatArray(v) => floats(v),
            UniformValue::IntArray(v) => v.iter().map(|i| *i as u32).collect(),
        }
    }
}

/// Lays `value` out as the bytes of a member of type `kind`, starting at the
/// member's first byte. Returns `None` when the shapes disagree.
pub(crate) fn encode(kind: &UniformKind, value: &UniformValue) -> Option<Vec<u8>> {
    let words = value.words();

    let scalars_agree = match (kind.scalar_type(), value.scalar_type()) {
        (a, b) if a == b => true,
        (ScalarType::Uint, ScalarType::Sint) => words.iter().all(|w| (*w as i32) >= 0),
        (ScalarType::Sint, ScalarType::Uint) => words.iter().all(|w| *w <= i32::MAX as u32),
        _ => false,
    };
    if !scalars_agree {
        return None;
    }

    let mut offsets = Vec::with_capacity(kind.component_count());
    kind.word_offsets(0, &mut offsets);

    let shape_agrees = match kind {
        UniformKind::Array { element, .. } => {
            let per = element.component_count();
            !words.is_empty() && words.len() <= offsets.len() && words.len() % per == 0
        }
        _ => words.len() == offsets.len(),
    };
    if !shape_agrees {
        return None;
    }

    let end = offsets[words.len() - 1] as usize + 4;
    let mut bytes = vec![0u8; end];
    for (word, &offset) in words.iter().zip(&offsets) {
        let at = offset as usize;
        bytes[at..at + 4].copy_from_slice(&word.to_le_bytes());
    }
    Some(bytes)
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<u32> for UniformValue {
    fn from(v: u32) -> Self {
        UniformValue::Uint(v)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(v: [f32; 2]) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(v: [f32; 3]) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(v: [f32; 4]) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<[f32; 9]> for UniformValue {
    fn from(v: [f32; 9]) -> Self {
        UniformValue::Mat3(v)
    }
}

impl From<[f32; 16]> for UniformValue {
    fn from(v: [f32; 16]) -> Self {
        UniformValue::Mat4(v)
    }
}

impl From<&[f32]> for UniformValue {
    fn from(v: &[f32]) -> Self {
        UniformValue::FloatArray(v.to_vec())
    }
}

impl From<Vec<f32>> for UniformValue {
    fn from(v: Vec<f32>) -> Self {
        UniformValue::FloatArray(v)
    }
}

impl From<&[i32]> for UniformValue {
    fn from(v: &[i32]) -> Self {
        UniformValue::IntArray(v.to_vec())
    }
}

impl From<Vec<i32>> for UniformValue {
    fn from(v: Vec<i32>) -> Self {
        UniformValue::IntArray(v)
    }
}

impl From<glam::Vec2> for UniformValue {
    fn from(v: glam::Vec2) -> Self {
        UniformValue::Vec2(v.to_array())
    }
}

impl From<glam::Vec3> for UniformValue {
    fn from(v: glam::Vec3) -> Self {
        UniformValue::Vec3(v.to_array())
    }
}

impl From<glam::Vec4> for UniformValue {
    fn from(v: glam::Vec4) -> Self {
        UniformValue::Vec4(v.to_array())
    }
}

impl From<glam::Mat3> for UniformValue {
    fn from(m: glam::Mat3) -> Self {
        UniformValue::Mat3(m.to_cols_array())
    }
}

impl From<glam::Mat4> for UniformValue {
    fn from(m: glam::Mat4) -> Self {
        UniformValue::Mat4(m.to_cols_array())
    }
}

impl From<Color> for UniformValue {
    fn from(c: Color) -> Self {
        UniformValue::Vec4([c.r, c.g, c.b, c.a])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floats_at(bytes: &[u8], offset: usize, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| {
                let at = offset + i * 4;
                f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
            })
            .collect()
    }

    #[test]
    fn mat3_columns_are_padded_to_sixteen_bytes() {
        let m = glam::Mat3::from_cols_array(&[1., 2., 3., 4., 5., 6., 7., 8., 9.]);
        let bytes = encode(&UniformKind::Matrix { columns: 3, rows: 3 }, &m.into()).unwrap();
        assert_eq!(bytes.len(), 16 * 2 + 12);
        assert_eq!(floats_at(&bytes, 0, 3), vec![1., 2., 3.]);
        assert_eq!(floats_at(&bytes, 16, 3), vec![4., 5., 6.]);
        assert_eq!(floats_at(&bytes, 32, 3), vec![7., 8., 9.]);
    }

    #[test]
    fn mat4_is_sixty_four_contiguous_bytes() {
        let bytes = encode(
            &UniformKind::Matrix { columns: 4, rows: 4 },
            &glam::Mat4::IDENTITY.into(),
        )
        .unwrap();
        assert_eq!(bytes.len(), 64);
        assert_eq!(floats_at(&bytes, 20, 1), vec![1.0]);
    }

    #[test]
    fn arrays_honour_reflected_stride() {
        let kind = UniformKind::Array {
            element: Box::new(UniformKind::Scalar(ScalarType::Float)),
            len: 4,
            stride: 16,
        };
        let bytes = encode(&kind, &UniformValue::from(&[1.0f32, 2.0][..])).unwrap();
        assert_eq!(bytes.len(), 20);
        assert_eq!(floats_at(&bytes, 16, 1), vec![2.0]);
    }

    #[test]
    fn arrays_reject_partial_elements_and_overflow() {
        let kind = UniformKind::Array {
            element: Box::new(UniformKind::Vector(ScalarType::Float, 2)),
            len: 2,
            stride: 8,
        };
        assert!(encode(&kind, &UniformValue::from(vec![1.0; 3])).is_none());
        assert!(encode(&kind, &UniformValue::from(vec![1.0; 6])).is_none());
        assert!(encode(&kind, &UniformValue::from(vec![1.0; 4])).is_some());
    }

    #[test]
    fn shape_and_scalar_mismatches_are_rejected() {
        let vec4 = UniformKind::Vector(ScalarType::Float, 4);
        assert!(encode(&vec4, &UniformValue::Vec3([0.0; 3])).is_none());
        assert!(encode(&vec4, &UniformValue::IntArray(vec![0; 4])).is_none());
        assert!(encode(&UniformKind::Scalar(ScalarType::Float), &1i32.into()).is_none());
    }

    #[test]
    fn non_negative_ints_fit_unsigned_uniforms() {
        let uint = UniformKind::Scalar(ScalarType::Uint);
        assert_eq!(encode(&uint, &3i32.into()), Some(3u32.to_le_bytes().to_vec()));
        assert!(encode(&uint, &(-1i32).into()).is_none());
    }

    #[test]
    fn display_uses_wgsl_spelling() {
        let kind = UniformKind::Array {
            element: Box::new(UniformKind::Vector(ScalarType::Float, 4)),
            len: 8,
            stride: 16,
        };
        assert_eq!(kind.to_string(), "array<vec4<f32>, 8>");
        assert_eq!(UniformKind::Matrix { columns: 4, rows: 4 }.to_string(), "mat4x4<f32>");
    }
}
