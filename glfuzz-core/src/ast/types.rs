//! Types of the shading language.
//!
//! Types are interned: a `TypeRef` is a small handle into a process-wide,
//! append-only table keyed by structural identity. Declarations and
//! expressions share the same handle for the same type, so types are the
//! only nodes that may have several parents.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use once_cell::sync::Lazy;

/// Numeric, boolean, vector and matrix types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BasicType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    UInt,
    UVec2,
    UVec3,
    UVec4,
    Bool,
    BVec2,
    BVec3,
    BVec4,
    Mat2x2,
    Mat2x3,
    Mat2x4,
    Mat3x2,
    Mat3x3,
    Mat3x4,
    Mat4x2,
    Mat4x3,
    Mat4x4,
}

const BASIC_TYPES: [BasicType; 25] = [
    BasicType::Float,
    BasicType::Vec2,
    BasicType::Vec3,
    BasicType::Vec4,
    BasicType::Int,
    BasicType::IVec2,
    BasicType::IVec3,
    BasicType::IVec4,
    BasicType::UInt,
    BasicType::UVec2,
    BasicType::UVec3,
    BasicType::UVec4,
    BasicType::Bool,
    BasicType::BVec2,
    BasicType::BVec3,
    BasicType::BVec4,
    BasicType::Mat2x2,
    BasicType::Mat2x3,
    BasicType::Mat2x4,
    BasicType::Mat3x2,
    BasicType::Mat3x3,
    BasicType::Mat3x4,
    BasicType::Mat4x2,
    BasicType::Mat4x3,
    BasicType::Mat4x4,
];

impl BasicType {
    pub fn all() -> &'static [BasicType] {
        &BASIC_TYPES
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
            Self::Int => "int",
            Self::IVec2 => "ivec2",
            Self::IVec3 => "ivec3",
            Self::IVec4 => "ivec4",
            Self::UInt => "uint",
            Self::UVec2 => "uvec2",
            Self::UVec3 => "uvec3",
            Self::UVec4 => "uvec4",
            Self::Bool => "bool",
            Self::BVec2 => "bvec2",
            Self::BVec3 => "bvec3",
            Self::BVec4 => "bvec4",
            Self::Mat2x2 => "mat2",
            Self::Mat2x3 => "mat2x3",
            Self::Mat2x4 => "mat2x4",
            Self::Mat3x2 => "mat3x2",
            Self::Mat3x3 => "mat3",
            Self::Mat3x4 => "mat3x4",
            Self::Mat4x2 => "mat4x2",
            Self::Mat4x3 => "mat4x3",
            Self::Mat4x4 => "mat4",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "mat2x2" => return Some(Self::Mat2x2),
            "mat3x3" => return Some(Self::Mat3x3),
            "mat4x4" => return Some(Self::Mat4x4),
            _ => {}
        }
        BASIC_TYPES.iter().find(|t| t.name() == name).copied()
    }

    /// Scalar type of the components: the type itself for scalars, `float` for matrices.
    pub fn element_type(&self) -> BasicType {
        match self {
            Self::Float | Self::Vec2 | Self::Vec3 | Self::Vec4 => Self::Float,
            Self::Int | Self::IVec2 | Self::IVec3 | Self::IVec4 => Self::Int,
            Self::UInt | Self::UVec2 | Self::UVec3 | Self::UVec4 => Self::UInt,
            Self::Bool | Self::BVec2 | Self::BVec3 | Self::BVec4 => Self::Bool,
            _ => Self::Float,
        }
    }

    pub fn num_elements(&self) -> usize {
        if let Some((cols, rows)) = self.matrix_dims() {
            return cols * rows;
        }
        match self {
            Self::Float | Self::Int | Self::UInt | Self::Bool => 1,
            Self::Vec2 | Self::IVec2 | Self::UVec2 | Self::BVec2 => 2,
            Self::Vec3 | Self::IVec3 | Self::UVec3 | Self::BVec3 => 3,
            _ => 4,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Float | Self::Int | Self::UInt | Self::Bool)
    }

    pub fn is_vector(&self) -> bool {
        !self.is_scalar() && !self.is_matrix()
    }

    pub fn is_matrix(&self) -> bool {
        self.matrix_dims().is_some()
    }

    pub fn is_boolean(&self) -> bool {
        self.element_type() == Self::Bool
    }

    /// Columns and rows of a matrix type.
    pub fn matrix_dims(&self) -> Option<(usize, usize)> {
        match self {
            Self::Mat2x2 => Some((2, 2)),
            Self::Mat2x3 => Some((2, 3)),
            Self::Mat2x4 => Some((2, 4)),
            Self::Mat3x2 => Some((3, 2)),
            Self::Mat3x3 => Some((3, 3)),
            Self::Mat3x4 => Some((3, 4)),
            Self::Mat4x2 => Some((4, 2)),
            Self::Mat4x3 => Some((4, 3)),
            Self::Mat4x4 => Some((4, 4)),
            _ => None,
        }
    }

    pub fn make_matrix(cols: usize, rows: usize) -> Option<Self> {
        BASIC_TYPES
            .iter()
            .find(|t| t.matrix_dims() == Some((cols, rows)))
            .copied()
    }

    /// Build the vector (or scalar, for width 1) with the given element type.
    pub fn make_vector(element: BasicType, width: usize) -> Option<Self> {
        if !element.is_scalar() {
            return None;
        }
        BASIC_TYPES
            .iter()
            .find(|t| !t.is_matrix() && t.element_type() == element && t.num_elements() == width)
            .copied()
    }

    /// Type of one column of a matrix, or of one element of a vector.
    pub fn column_type(&self) -> BasicType {
        match self.matrix_dims() {
            Some((_, rows)) => Self::make_vector(Self::Float, rows).unwrap_or(Self::Float),
            None => self.element_type(),
        }
    }

    /// Text of the literal used as the canonical constant of a scalar type.
    pub fn canonical_literal(&self) -> &'static str {
        match self.element_type() {
            Self::Int => "1",
            Self::UInt => "1u",
            Self::Bool => "true",
            _ => "1.0",
        }
    }
}

impl fmt::Display for BasicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const OPAQUE_TYPES: &[&str] = &[
    "sampler2D",
    "sampler3D",
    "samplerCube",
    "sampler2DShadow",
    "samplerCubeShadow",
    "sampler2DArray",
    "sampler2DArrayShadow",
    "isampler2D",
    "isampler3D",
    "isamplerCube",
    "isampler2DArray",
    "usampler2D",
    "usampler3D",
    "usamplerCube",
    "usampler2DArray",
    "samplerExternalOES",
    "image2D",
    "iimage2D",
    "uimage2D",
    "image3D",
    "atomic_uint",
];

/// Return the canonical name if `name` is a sampler, image or atomic counter type.
pub fn opaque_type_name(name: &str) -> Option<&'static str> {
    OPAQUE_TYPES.iter().find(|n| **n == name).copied()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeQualifier {
    Const,
    In,
    Out,
    InOut,
    Uniform,
    Attribute,
    Varying,
    Buffer,
    Shared,
    Centroid,
    Flat,
    Smooth,
    NoPerspective,
    Invariant,
    Highp,
    Mediump,
    Lowp,
    Coherent,
    Volatile,
    Restrict,
    ReadOnly,
    WriteOnly,
    /// `layout(...)`, holding the text between the parentheses.
    Layout(String),
}

impl TypeQualifier {
    pub fn from_keyword(word: &str) -> Option<Self> {
        let q = match word {
            "const" => Self::Const,
            "in" => Self::In,
            "out" => Self::Out,
            "inout" => Self::InOut,
            "uniform" => Self::Uniform,
            "attribute" => Self::Attribute,
            "varying" => Self::Varying,
            "buffer" => Self::Buffer,
            "shared" => Self::Shared,
            "centroid" => Self::Centroid,
            "flat" => Self::Flat,
            "smooth" => Self::Smooth,
            "noperspective" => Self::NoPerspective,
            "invariant" => Self::Invariant,
            "highp" => Self::Highp,
            "mediump" => Self::Mediump,
            "lowp" => Self::Lowp,
            "coherent" => Self::Coherent,
            "volatile" => Self::Volatile,
            "restrict" => Self::Restrict,
            "readonly" => Self::ReadOnly,
            "writeonly" => Self::WriteOnly,
            _ => return None,
        };
        Some(q)
    }

    /// Qualifiers that tie a global variable to the pipeline interface.
    pub fn is_interface(&self) -> bool {
        matches!(
            self,
            Self::In
                | Self::Out
                | Self::Uniform
                | Self::Attribute
                | Self::Varying
                | Self::Buffer
                | Self::Shared
                | Self::Layout(_)
                | Self::Centroid
                | Self::Flat
                | Self::Smooth
                | Self::NoPerspective
                | Self::Invariant
        )
    }

    pub fn is_precision(&self) -> bool {
        matches!(self, Self::Highp | Self::Mediump | Self::Lowp)
    }
}

impl fmt::Display for TypeQualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Const => "const",
            Self::In => "in",
            Self::Out => "out",
            Self::InOut => "inout",
            Self::Uniform => "uniform",
            Self::Attribute => "attribute",
            Self::Varying => "varying",
            Self::Buffer => "buffer",
            Self::Shared => "shared",
            Self::Centroid => "centroid",
            Self::Flat => "flat",
            Self::Smooth => "smooth",
            Self::NoPerspective => "noperspective",
            Self::Invariant => "invariant",
            Self::Highp => "highp",
            Self::Mediump => "mediump",
            Self::Lowp => "lowp",
            Self::Coherent => "coherent",
            Self::Volatile => "volatile",
            Self::Restrict => "restrict",
            Self::ReadOnly => "readonly",
            Self::WriteOnly => "writeonly",
            Self::Layout(inner) => return write!(f, "layout({inner})"),
        };
        f.write_str(s)
    }
}

/// Structural description of a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Basic(BasicType),
    /// Samplers, images and atomic counters.
    Opaque(&'static str),
    Struct(String),
    Array { base: TypeRef, size: Option<u32> },
    Qualified { qualifiers: Vec<TypeQualifier>, base: TypeRef },
}

/// Handle to an interned type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef(u32);

#[derive(Default)]
struct TypeTable {
    kinds: Vec<TypeKind>,
    index: HashMap<TypeKind, TypeRef>,
}

static TYPE_TABLE: Lazy<RwLock<TypeTable>> = Lazy::new(|| RwLock::new(TypeTable::default()));

impl TypeRef {
    pub fn intern(kind: TypeKind) -> Self {
        {
            let table = TYPE_TABLE.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(t) = table.index.get(&kind) {
                return *t;
            }
        }
        let mut table = TYPE_TABLE.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(t) = table.index.get(&kind) {
            return *t;
        }
        let t = TypeRef(table.kinds.len() as u32);
        table.kinds.push(kind.clone());
        table.index.insert(kind, t);
        t
    }

    pub fn kind(self) -> TypeKind {
        let table = TYPE_TABLE.read().unwrap_or_else(PoisonError::into_inner);
        table.kinds[self.0 as usize].clone()
    }

    pub fn void() -> Self {
        Self::intern(TypeKind::Void)
    }

    pub fn basic(ty: BasicType) -> Self {
        Self::intern(TypeKind::Basic(ty))
    }

    pub fn opaque(name: &'static str) -> Self {
        Self::intern(TypeKind::Opaque(name))
    }

    pub fn struct_named(name: &str) -> Self {
        Self::intern(TypeKind::Struct(name.to_string()))
    }

    /// Array of `base`; qualifiers on `base` are hoisted onto the array type.
    pub fn array(base: TypeRef, size: Option<u32>) -> Self {
        let qualifiers = base.qualifiers();
        let array = Self::intern(TypeKind::Array {
            base: base.without_qualifiers(),
            size,
        });
        Self::qualified(qualifiers, array)
    }

    pub fn qualified(qualifiers: Vec<TypeQualifier>, base: TypeRef) -> Self {
        if qualifiers.is_empty() {
            return base;
        }
        match base.kind() {
            TypeKind::Qualified {
                qualifiers: mut inner,
                base,
            } => {
                inner.extend(qualifiers);
                Self::intern(TypeKind::Qualified {
                    qualifiers: inner,
                    base,
                })
            }
            _ => Self::intern(TypeKind::Qualified { qualifiers, base }),
        }
    }

    pub fn without_qualifiers(self) -> Self {
        match self.kind() {
            TypeKind::Qualified { base, .. } => base.without_qualifiers(),
            _ => self,
        }
    }

    pub fn qualifiers(self) -> Vec<TypeQualifier> {
        match self.kind() {
            TypeKind::Qualified { qualifiers, .. } => qualifiers,
            _ => vec![],
        }
    }

    pub fn has_qualifier(self, qualifier: &TypeQualifier) -> bool {
        self.qualifiers().contains(qualifier)
    }

    /// Keep only the qualifiers accepted by `keep`.
    pub fn retain_qualifiers(self, keep: impl Fn(&TypeQualifier) -> bool) -> Self {
        let qualifiers = self.qualifiers().into_iter().filter(|q| keep(q)).collect();
        Self::qualified(qualifiers, self.without_qualifiers())
    }

    /// Type equality that ignores qualifiers.
    pub fn same_unqualified(self, other: TypeRef) -> bool {
        self.without_qualifiers() == other.without_qualifiers()
    }

    pub fn as_basic(self) -> Option<BasicType> {
        match self.without_qualifiers().kind() {
            TypeKind::Basic(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_void(self) -> bool {
        matches!(self.without_qualifiers().kind(), TypeKind::Void)
    }

    pub fn is_array(self) -> bool {
        matches!(self.without_qualifiers().kind(), TypeKind::Array { .. })
    }

    pub fn array_element(self) -> Option<TypeRef> {
        match self.without_qualifiers().kind() {
            TypeKind::Array { base, .. } => Some(base),
            _ => None,
        }
    }

    pub fn array_size(self) -> Option<u32> {
        match self.without_qualifiers().kind() {
            TypeKind::Array { size, .. } => size,
            _ => None,
        }
    }

    pub fn struct_name(self) -> Option<String> {
        match self.without_qualifiers().kind() {
            TypeKind::Struct(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_opaque(self) -> bool {
        matches!(self.without_qualifiers().kind(), TypeKind::Opaque(_))
    }
}

impl fmt::Display for TypeRef {
    /// Arrays print as `base[size]`; declarations print the size after the name instead.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            TypeKind::Void => f.write_str("void"),
            TypeKind::Basic(b) => f.write_str(b.name()),
            TypeKind::Opaque(name) => f.write_str(name),
            TypeKind::Struct(name) => f.write_str(&name),
            TypeKind::Array { base, size } => match size {
                Some(size) => write!(f, "{base}[{size}]"),
                None => write!(f, "{base}[]"),
            },
            TypeKind::Qualified { qualifiers, base } => {
                for q in qualifiers {
                    write!(f, "{q} ")?;
                }
                write!(f, "{base}")
            }
        }
    }
}

#[test]
fn test_interned_types_are_shared() {
    let a = TypeRef::basic(BasicType::Vec3);
    let b = TypeRef::intern(TypeKind::Basic(BasicType::Vec3));
    assert_eq!(a, b);
    let c = TypeRef::qualified(vec![TypeQualifier::Const], a);
    assert_ne!(a, c);
    assert!(c.same_unqualified(a));
    assert!(c.has_qualifier(&TypeQualifier::Const));
    assert_eq!(c.to_string(), "const vec3");
}

#[test]
fn test_basic_type_shapes() {
    assert_eq!(BasicType::make_vector(BasicType::Int, 3), Some(BasicType::IVec3));
    assert_eq!(BasicType::make_vector(BasicType::Float, 1), Some(BasicType::Float));
    assert_eq!(BasicType::Mat2x3.column_type(), BasicType::Vec3);
    assert_eq!(BasicType::Mat3x3.num_elements(), 9);
    assert_eq!(BasicType::from_name("mat4x4"), Some(BasicType::Mat4x4));
    assert!(BasicType::BVec2.is_boolean());
}

#[test]
fn test_array_hoists_qualifiers() {
    let base = TypeRef::qualified(vec![TypeQualifier::Uniform], TypeRef::basic(BasicType::Float));
    let arr = TypeRef::array(base, Some(3));
    assert!(arr.has_qualifier(&TypeQualifier::Uniform));
    assert!(arr.is_array());
    assert_eq!(arr.array_element(), Some(TypeRef::basic(BasicType::Float)));
}
