//! Helpers shared by the unit tests.

use crate::{ast::*, FuzzRng, IdGenerator};

pub fn parse_frag(src: &str) -> TranslationUnit {
    match parse(src, ShaderKind::Fragment) {
        Ok(tu) => tu,
        Err(err) => panic!("fail to parse test shader: {err}\n{src}"),
    }
}

/// Compare by rendering both sides, so layout differences do not matter.
pub fn assert_same_program(tu: &TranslationUnit, expected: &str) {
    let expected = parse(expected, tu.kind).unwrap();
    assert_eq!(render(tu), render(&expected));
}

pub fn rng() -> FuzzRng {
    FuzzRng::new(0x5eed)
}

pub fn ids() -> IdGenerator {
    IdGenerator::new()
}

/// Fresh directory under the system temp dir.
pub fn temp_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("glfuzz_test_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
