//! Language versions and shader stages.

use std::fmt;

use super::BasicType;
use crate::GlFuzzError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShadingLanguageVersion {
    Essl100,
    Essl300,
    Essl310,
    Essl320,
    Glsl110,
    Glsl120,
    Glsl130,
    Glsl140,
    Glsl150,
    Glsl330,
    Glsl400,
    Glsl410,
    Glsl420,
    Glsl430,
    Glsl440,
    Glsl450,
    Glsl460,
    /// ESSL 100 restricted to what WebGL 1 accepts.
    WebGl,
    /// ESSL 300 restricted to what WebGL 2 accepts.
    WebGl2,
}

impl Default for ShadingLanguageVersion {
    fn default() -> Self {
        Self::Essl100
    }
}

impl ShadingLanguageVersion {
    /// Resolve the text following `#version`, e.g. `300 es`.
    pub fn from_version_string(text: &str, webgl: bool) -> Result<Self, GlFuzzError> {
        let mut words = text.split_whitespace();
        let number = words.next().unwrap_or_default();
        let es = matches!(words.next(), Some("es"));
        let v = match (number, es || number == "100") {
            ("100", _) if webgl => Self::WebGl,
            ("100", _) => Self::Essl100,
            ("300", true) if webgl => Self::WebGl2,
            ("300", true) => Self::Essl300,
            ("310", true) => Self::Essl310,
            ("320", true) => Self::Essl320,
            ("110", false) => Self::Glsl110,
            ("120", false) => Self::Glsl120,
            ("130", false) => Self::Glsl130,
            ("140", false) => Self::Glsl140,
            ("150", false) => Self::Glsl150,
            ("330", false) => Self::Glsl330,
            ("400", false) => Self::Glsl400,
            ("410", false) => Self::Glsl410,
            ("420", false) => Self::Glsl420,
            ("430", false) => Self::Glsl430,
            ("440", false) => Self::Glsl440,
            ("450", false) => Self::Glsl450,
            ("460", false) => Self::Glsl460,
            _ => {
                return Err(GlFuzzError::Parse {
                    line: 1,
                    column: 1,
                    message: format!("unknown shading language version `{text}`"),
                })
            }
        };
        Ok(v)
    }

    /// Text that follows `#version`.
    pub fn version_string(&self) -> &'static str {
        match self {
            Self::Essl100 | Self::WebGl => "100",
            Self::Essl300 | Self::WebGl2 => "300 es",
            Self::Essl310 => "310 es",
            Self::Essl320 => "320 es",
            Self::Glsl110 => "110",
            Self::Glsl120 => "120",
            Self::Glsl130 => "130",
            Self::Glsl140 => "140",
            Self::Glsl150 => "150",
            Self::Glsl330 => "330",
            Self::Glsl400 => "400",
            Self::Glsl410 => "410",
            Self::Glsl420 => "420",
            Self::Glsl430 => "430",
            Self::Glsl440 => "440",
            Self::Glsl450 => "450",
            Self::Glsl460 => "460",
        }
    }

    pub fn is_webgl(&self) -> bool {
        matches!(self, Self::WebGl | Self::WebGl2)
    }

    pub fn is_essl(&self) -> bool {
        matches!(
            self,
            Self::Essl100 | Self::Essl300 | Self::Essl310 | Self::Essl320 | Self::WebGl | Self::WebGl2
        )
    }

    fn is_legacy(&self) -> bool {
        matches!(
            self,
            Self::Essl100 | Self::WebGl | Self::Glsl110 | Self::Glsl120
        )
    }

    pub fn global_variable_initializers_must_be_const(&self) -> bool {
        matches!(self, Self::Essl100 | Self::WebGl)
    }

    /// GLSL 4.20 relaxed const initializers to any expression.
    pub fn initializers_of_const_must_be_const(&self) -> bool {
        !matches!(
            self,
            Self::Glsl420 | Self::Glsl430 | Self::Glsl440 | Self::Glsl450 | Self::Glsl460
        )
    }

    /// ESSL 1.00 appendix A: loop headers have a fixed shape and the loop
    /// variable may not be written in the body.
    pub fn restricted_for_loops(&self) -> bool {
        matches!(self, Self::Essl100 | Self::WebGl)
    }

    pub fn restricted_array_indexing(&self) -> bool {
        matches!(self, Self::Essl100 | Self::WebGl)
    }

    pub fn supports_switch(&self) -> bool {
        !self.is_legacy()
    }

    pub fn supports_unsigned(&self) -> bool {
        !self.is_legacy()
    }

    pub fn supports_non_square_matrices(&self) -> bool {
        !matches!(self, Self::Essl100 | Self::WebGl | Self::Glsl110)
    }

    /// Basic types a declaration may use in this version.
    pub fn supported_basic_types(&self) -> Vec<BasicType> {
        BasicType::all()
            .iter()
            .copied()
            .filter(|t| self.supports_unsigned() || t.element_type() != BasicType::UInt)
            .filter(|t| match t.matrix_dims() {
                Some((cols, rows)) => cols == rows || self.supports_non_square_matrices(),
                None => true,
            })
            .collect()
    }
}

impl fmt::Display for ShadingLanguageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.version_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderKind {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderKind {
    pub const ALL: [ShaderKind; 3] = [Self::Vertex, Self::Fragment, Self::Compute];

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::Fragment => "frag",
            Self::Compute => "comp",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL.iter().find(|k| k.extension() == ext).copied()
    }
}

impl fmt::Display for ShaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Compute => "compute",
        };
        f.write_str(s)
    }
}

#[test]
fn test_version_properties() {
    let v = ShadingLanguageVersion::from_version_string("300 es", false).unwrap();
    assert_eq!(v, ShadingLanguageVersion::Essl300);
    assert!(v.supports_switch());
    assert!(!v.restricted_for_loops());
    let w = ShadingLanguageVersion::from_version_string("100", true).unwrap();
    assert_eq!(w, ShadingLanguageVersion::WebGl);
    assert!(w.global_variable_initializers_must_be_const());
    assert!(w.restricted_for_loops());
    let g = ShadingLanguageVersion::from_version_string("450", false).unwrap();
    assert!(!g.initializers_of_const_must_be_const());
    assert!(ShadingLanguageVersion::from_version_string("300", false).is_err());
}
