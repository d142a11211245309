//! Shader jobs on disk.
//!
//! A shader job is a `.json` file of uniform and pipeline data plus the
//! `.vert`, `.frag` and `.comp` shaders that share its stem.

mod io;

pub use io::*;

use std::fs;
use std::path::{Path, PathBuf};

use crate::ast::*;
use crate::error::io_error;
use crate::utils;
use crate::GlFuzzError;

#[derive(Debug, Clone)]
pub struct ShaderJob {
    pub uniforms: serde_json::Value,
    /// At most one shader per kind, ordered by kind.
    pub shaders: Vec<TranslationUnit>,
}

impl ShaderJob {
    pub fn new(uniforms: serde_json::Value, mut shaders: Vec<TranslationUnit>) -> Self {
        shaders.sort_by_key(|s| s.kind);
        Self { uniforms, shaders }
    }

    /// Load the job whose `.json` file is `json_path`.
    pub fn load(json_path: &Path) -> Result<Self, GlFuzzError> {
        let text = fs::read_to_string(json_path).map_err(|e| io_error(e, json_path))?;
        let uniforms: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            GlFuzzError::InvalidShaderJob(format!("{}: {e}", json_path.display()))
        })?;
        let mut shaders = vec![];
        for kind in ShaderKind::ALL {
            let path = json_path.with_extension(kind.extension());
            if !path.exists() {
                continue;
            }
            let source = fs::read_to_string(&path).map_err(|e| io_error(e, &path))?;
            crate::log!(debug, "parse {kind} shader {path:?}");
            shaders.push(parse(&source, kind)?);
        }
        if shaders.is_empty() {
            return Err(GlFuzzError::InvalidShaderJob(format!(
                "{} has no shader next to it",
                json_path.display()
            )));
        }
        Ok(Self { uniforms, shaders })
    }

    /// Write the job as `json_path` plus one file per shader.
    pub fn write(&self, json_path: &Path) -> Result<(), GlFuzzError> {
        if let Some(dir) = json_path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).map_err(|e| io_error(e, dir))?;
            }
        }
        let json = serde_json::to_string_pretty(&self.uniforms)
            .map_err(|e| GlFuzzError::InvalidShaderJob(e.to_string()))?;
        fs::write(json_path, json).map_err(|e| io_error(e, json_path))?;
        for shader in &self.shaders {
            let path = json_path.with_extension(shader.kind.extension());
            fs::write(&path, render(shader)).map_err(|e| io_error(e, &path))?;
        }
        Ok(())
    }

    /// Files making up the job stored at `json_path`.
    pub fn files(&self, json_path: &Path) -> Vec<PathBuf> {
        std::iter::once(json_path.to_path_buf())
            .chain(
                self.shaders
                    .iter()
                    .map(|s| json_path.with_extension(s.kind.extension())),
            )
            .collect()
    }

    pub fn content_hash(&self) -> u64 {
        let rendered: Vec<String> = self.shaders.iter().map(render).collect();
        let json = self.uniforms.to_string();
        utils::hash_parts(rendered.iter().map(String::as_str).chain([json.as_str()]))
    }

    /// Non-whitespace characters of the rendered shaders.
    pub fn size(&self) -> usize {
        self.shaders
            .iter()
            .map(|s| utils::non_whitespace_len(&render(s)))
            .sum()
    }

    pub fn shader(&self, kind: ShaderKind) -> Option<&TranslationUnit> {
        self.shaders.iter().find(|s| s.kind == kind)
    }

    pub fn shader_mut(&mut self, kind: ShaderKind) -> Option<&mut TranslationUnit> {
        self.shaders.iter_mut().find(|s| s.kind == kind)
    }

    /// Record a uniform in the JSON data unless it is already there.
    pub fn add_uniform(&mut self, name: &str, value: serde_json::Value) -> bool {
        if !self.uniforms.is_object() {
            self.uniforms = serde_json::Value::Object(Default::default());
        }
        match self.uniforms.as_object_mut() {
            Some(map) if !map.contains_key(name) => {
                map.insert(name.to_string(), value);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    #[test]
    fn test_write_and_load_job() {
        let dir = test::temp_dir("depot_job");
        let job = ShaderJob::new(
            serde_json::json!({ "u": { "func": "glUniform1f", "args": [1.0] } }),
            vec![test::parse_frag("uniform float u; void main() { gl_FragColor = vec4(u); }")],
        );
        let path = dir.join("shader.json");
        job.write(&path).unwrap();
        assert!(dir.join("shader.frag").exists());
        let loaded = ShaderJob::load(&path).unwrap();
        assert_eq!(loaded.content_hash(), job.content_hash());
        assert_eq!(loaded.size(), job.size());
        assert!(loaded.shader(ShaderKind::Vertex).is_none());

        fs::write(dir.join("empty.json"), "{}").unwrap();
        let err = ShaderJob::load(&dir.join("empty.json")).unwrap_err();
        assert!(matches!(err, GlFuzzError::InvalidShaderJob(_)));
    }

    #[test]
    fn test_size_ignores_whitespace() {
        let job = ShaderJob::new(serde_json::json!({}), vec![test::parse_frag("void main() { }")]);
        assert_eq!(job.size(), "voidmain(){}".len());
    }
}
