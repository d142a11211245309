use std::collections::{BTreeMap, BTreeSet};

use crate::ast::*;

/// Where a name in scope was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclSite {
    /// Parameter `index` of the function `function`.
    Parameter { function: NodeId, index: usize },
    /// Declarator `info` of the declaration statement `decl`.
    Variable { decl: NodeId, info: NodeId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeEntry {
    pub ty: TypeRef,
    pub site: DeclSite,
}

impl ScopeEntry {
    pub fn variable(decl: &VariablesDeclaration, info: &VariableDeclInfo) -> Self {
        Self {
            ty: decl.declared_type(info),
            site: DeclSite::Variable {
                decl: decl.id,
                info: info.id,
            },
        }
    }

    pub fn is_parameter(&self) -> bool {
        matches!(self.site, DeclSite::Parameter { .. })
    }

    /// Id of the declaration statement holding the declarator, for variables.
    pub fn variables_declaration(&self) -> Option<NodeId> {
        match self.site {
            DeclSite::Variable { decl, .. } => Some(decl),
            DeclSite::Parameter { .. } => None,
        }
    }

    pub fn declarator(&self) -> Option<NodeId> {
        match self.site {
            DeclSite::Variable { info, .. } => Some(info),
            DeclSite::Parameter { .. } => None,
        }
    }
}

/// Chain of lexical frames; inner frames shadow outer ones.
#[derive(Debug, Clone)]
pub struct Scope {
    frames: Vec<BTreeMap<String, ScopeEntry>>,
    structs: BTreeMap<String, StructDefinition>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    /// Scope holding just the global frame.
    pub fn new() -> Self {
        Self {
            frames: vec![BTreeMap::new()],
            structs: BTreeMap::new(),
        }
    }

    pub fn push(&mut self) {
        self.frames.push(BTreeMap::new());
    }

    pub fn pop(&mut self) {
        assert!(self.frames.len() > 1, "the global frame can not be popped");
        self.frames.pop();
    }

    /// Number of frames, 1 at global scope.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn at_global_scope(&self) -> bool {
        self.frames.len() == 1
    }

    pub fn add(&mut self, name: &str, entry: ScopeEntry) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), entry);
        }
    }

    pub fn add_struct(&mut self, def: &StructDefinition) {
        self.structs.insert(def.name.clone(), def.clone());
    }

    pub fn lookup(&self, name: &str) -> Option<&ScopeEntry> {
        self.frames.iter().rev().find_map(|f| f.get(name))
    }

    pub fn lookup_type(&self, name: &str) -> Option<TypeRef> {
        self.lookup(name).map(|e| e.ty)
    }

    /// Whether `name` is declared in the innermost frame.
    pub fn declared_in_current_frame(&self, name: &str) -> bool {
        self.frames
            .last()
            .map(|f| f.contains_key(name))
            .unwrap_or(false)
    }

    /// Whether `name` resolves to a global variable.
    pub fn is_global(&self, name: &str) -> bool {
        match self.frames.iter().rposition(|f| f.contains_key(name)) {
            Some(index) => index == 0,
            None => false,
        }
    }

    pub fn struct_definition(&self, name: &str) -> Option<&StructDefinition> {
        self.structs.get(name)
    }

    /// Every visible variable name, sorted and without duplicates.
    pub fn names_of_all_variables(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self.frames.iter().flat_map(|f| f.keys()).collect();
        names.into_iter().cloned().collect()
    }

    /// Names declared in the innermost frame, sorted.
    pub fn names_in_current_frame(&self) -> Vec<String> {
        self.frames
            .last()
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Entries of the innermost frame, sorted by name.
    pub fn current_frame(&self) -> impl Iterator<Item = (&String, &ScopeEntry)> {
        self.frames.iter().last().into_iter().flat_map(|f| f.iter())
    }

    /// Snapshot that later declarations made through `self` do not affect.
    pub fn shallow_clone(&self) -> Self {
        self.clone()
    }
}

#[test]
fn test_shadowing_and_depth() {
    let int = TypeRef::basic(BasicType::Int);
    let float = TypeRef::basic(BasicType::Float);
    let entry = |ty| ScopeEntry {
        ty,
        site: DeclSite::Parameter {
            function: NodeId::fresh(),
            index: 0,
        },
    };
    let mut scope = Scope::new();
    scope.add("x", entry(int));
    assert!(scope.is_global("x"));
    scope.push();
    let snapshot = scope.shallow_clone();
    scope.add("x", entry(float));
    assert_eq!(scope.depth(), 2);
    assert_eq!(scope.lookup_type("x"), Some(float));
    assert!(!scope.is_global("x"));
    assert_eq!(snapshot.lookup_type("x"), Some(int));
    scope.pop();
    assert_eq!(scope.lookup_type("x"), Some(int));
    assert_eq!(scope.names_of_all_variables(), vec!["x".to_string()]);
}
