//! Builtin functions and variables of the shading language.

use crate::ast::*;

/// Functions whose result has the type of their first argument.
const GEN_TYPE_FUNCTIONS: &[&str] = &[
    "radians",
    "degrees",
    "sin",
    "cos",
    "tan",
    "asin",
    "acos",
    "atan",
    "sinh",
    "cosh",
    "tanh",
    "asinh",
    "acosh",
    "atanh",
    "pow",
    "exp",
    "log",
    "exp2",
    "log2",
    "sqrt",
    "inversesqrt",
    "abs",
    "sign",
    "floor",
    "trunc",
    "round",
    "roundEven",
    "ceil",
    "fract",
    "mod",
    "min",
    "max",
    "clamp",
    "mix",
    "step",
    "smoothstep",
    "normalize",
    "faceforward",
    "reflect",
    "refract",
    "dFdx",
    "dFdy",
    "fwidth",
    "matrixCompMult",
    "inverse",
    "not",
    "bitfieldExtract",
    "bitfieldInsert",
    "bitfieldReverse",
    "fma",
];

/// Functions that compare componentwise and return a boolean vector.
const RELATIONAL_FUNCTIONS: &[&str] = &[
    "lessThan",
    "lessThanEqual",
    "greaterThan",
    "greaterThanEqual",
    "equal",
    "notEqual",
    "isnan",
    "isinf",
];

const TEXTURE_FUNCTIONS: &[&str] = &[
    "texture",
    "texture2D",
    "texture2DLod",
    "texture2DProj",
    "texture2DProjLod",
    "texture3D",
    "textureCube",
    "textureCubeLod",
    "textureLod",
    "textureProj",
    "textureProjLod",
    "textureGrad",
    "textureOffset",
    "texelFetch",
    "texelFetchOffset",
    "textureLodOffset",
];

/// Builtins that write memory or synchronize.
const IMPURE_FUNCTIONS: &[&str] = &[
    "imageStore",
    "barrier",
    "memoryBarrier",
    "memoryBarrierShared",
    "memoryBarrierBuffer",
    "memoryBarrierImage",
    "groupMemoryBarrier",
    "EmitVertex",
    "EndPrimitive",
];

const OTHER_FUNCTIONS: &[&str] = &[
    "length",
    "distance",
    "dot",
    "cross",
    "any",
    "all",
    "transpose",
    "determinant",
    "outerProduct",
    "floatBitsToInt",
    "floatBitsToUint",
    "intBitsToFloat",
    "uintBitsToFloat",
    "packUnorm2x16",
    "packSnorm2x16",
    "packHalf2x16",
    "unpackUnorm2x16",
    "unpackSnorm2x16",
    "unpackHalf2x16",
    "textureSize",
    "bitCount",
    "findLSB",
    "findMSB",
];

pub fn is_builtin_function(name: &str) -> bool {
    GEN_TYPE_FUNCTIONS.contains(&name)
        || RELATIONAL_FUNCTIONS.contains(&name)
        || TEXTURE_FUNCTIONS.contains(&name)
        || IMPURE_FUNCTIONS.contains(&name)
        || OTHER_FUNCTIONS.contains(&name)
        || name.starts_with("atomic")
        || name.starts_with("image")
}

/// Whether calling the builtin has no effect besides producing its result.
pub fn is_pure_builtin(name: &str) -> bool {
    is_builtin_function(name)
        && !IMPURE_FUNCTIONS.contains(&name)
        && !name.starts_with("atomic")
        && !name.starts_with("image")
}

fn basic(b: BasicType) -> Option<TypeRef> {
    Some(TypeRef::basic(b))
}

/// Result type of a builtin call, when it can be told from the argument types.
pub fn builtin_return_type(name: &str, args: &[Option<TypeRef>]) -> Option<TypeRef> {
    let first = args.first().copied().flatten().map(|t| t.without_qualifiers());
    let first_basic = first.and_then(|t| t.as_basic());
    if GEN_TYPE_FUNCTIONS.contains(&name) {
        // `min(vec3, float)` and friends: the vector argument wins.
        if name == "step" || name == "smoothstep" {
            return args.last().copied().flatten().map(|t| t.without_qualifiers());
        }
        return first;
    }
    if RELATIONAL_FUNCTIONS.contains(&name) {
        let width = first_basic?.num_elements();
        return BasicType::make_vector(BasicType::Bool, width).map(TypeRef::basic);
    }
    if TEXTURE_FUNCTIONS.contains(&name) {
        let sampler = match first.map(|t| t.kind()) {
            Some(TypeKind::Opaque(s)) => s,
            _ => "",
        };
        return match sampler.chars().next() {
            Some('i') => basic(BasicType::IVec4),
            Some('u') => basic(BasicType::UVec4),
            _ => basic(BasicType::Vec4),
        };
    }
    match name {
        "length" | "distance" | "dot" | "determinant" => basic(BasicType::Float),
        "cross" => basic(BasicType::Vec3),
        "any" | "all" => basic(BasicType::Bool),
        "transpose" => {
            let (cols, rows) = first_basic?.matrix_dims()?;
            BasicType::make_matrix(rows, cols).map(TypeRef::basic)
        }
        "outerProduct" => {
            let rows = first_basic?.num_elements();
            let cols = args.get(1).copied().flatten()?.as_basic()?.num_elements();
            BasicType::make_matrix(cols, rows).map(TypeRef::basic)
        }
        "floatBitsToInt" | "bitCount" | "findLSB" | "findMSB" => {
            BasicType::make_vector(BasicType::Int, first_basic?.num_elements()).map(TypeRef::basic)
        }
        "floatBitsToUint" => {
            BasicType::make_vector(BasicType::UInt, first_basic?.num_elements()).map(TypeRef::basic)
        }
        "intBitsToFloat" | "uintBitsToFloat" => {
            BasicType::make_vector(BasicType::Float, first_basic?.num_elements())
                .map(TypeRef::basic)
        }
        "packUnorm2x16" | "packSnorm2x16" | "packHalf2x16" => basic(BasicType::UInt),
        "unpackUnorm2x16" | "unpackSnorm2x16" | "unpackHalf2x16" => basic(BasicType::Vec2),
        "textureSize" => basic(BasicType::IVec2),
        _ => None,
    }
}

/// Type of a builtin variable such as `gl_FragCoord`.
pub fn builtin_variable_type(name: &str, kind: ShaderKind) -> Option<TypeRef> {
    let b = match (name, kind) {
        ("gl_FragCoord", ShaderKind::Fragment) => BasicType::Vec4,
        ("gl_FragColor", ShaderKind::Fragment) => BasicType::Vec4,
        ("gl_FrontFacing", ShaderKind::Fragment) => BasicType::Bool,
        ("gl_PointCoord", ShaderKind::Fragment) => BasicType::Vec2,
        ("gl_FragDepth", ShaderKind::Fragment) => BasicType::Float,
        ("gl_Position", ShaderKind::Vertex) => BasicType::Vec4,
        ("gl_PointSize", ShaderKind::Vertex) => BasicType::Float,
        ("gl_VertexID", ShaderKind::Vertex) => BasicType::Int,
        ("gl_InstanceID", ShaderKind::Vertex) => BasicType::Int,
        ("gl_GlobalInvocationID", ShaderKind::Compute)
        | ("gl_LocalInvocationID", ShaderKind::Compute)
        | ("gl_WorkGroupID", ShaderKind::Compute)
        | ("gl_NumWorkGroups", ShaderKind::Compute)
        | ("gl_WorkGroupSize", ShaderKind::Compute) => BasicType::UVec3,
        ("gl_LocalInvocationIndex", ShaderKind::Compute) => BasicType::UInt,
        _ => return None,
    };
    Some(TypeRef::basic(b))
}

/// Builtin variables that a shader may write.
pub fn is_builtin_output(name: &str) -> bool {
    matches!(
        name,
        "gl_FragColor" | "gl_FragDepth" | "gl_Position" | "gl_PointSize"
    )
}

#[test]
fn test_builtin_return_types() {
    let vec3 = Some(TypeRef::basic(BasicType::Vec3));
    let float = Some(TypeRef::basic(BasicType::Float));
    assert_eq!(builtin_return_type("sin", &[vec3]), vec3);
    assert_eq!(builtin_return_type("dot", &[vec3, vec3]), float);
    assert_eq!(
        builtin_return_type("lessThan", &[vec3, vec3]),
        Some(TypeRef::basic(BasicType::BVec3))
    );
    assert_eq!(builtin_return_type("smoothstep", &[float, float, vec3]), vec3);
    assert_eq!(builtin_return_type("sin", &[None]), None);
    assert!(is_pure_builtin("texture"));
    assert!(!is_pure_builtin("atomicAdd"));
    assert!(!is_builtin_function("foo"));
}
