//! Locate nodes by id in a mutable tree and replace children.

use super::*;
use crate::GlFuzzError;

impl StmtKind {
    pub fn name(&self) -> &'static str {
        match self {
            StmtKind::Block(_) => "block",
            StmtKind::Decl(_) => "declaration",
            StmtKind::Expr(_) => "expression statement",
            StmtKind::If { .. } => "if",
            StmtKind::For { .. } => "for",
            StmtKind::While { .. } => "while",
            StmtKind::Do { .. } => "do",
            StmtKind::Switch { .. } => "switch",
            StmtKind::Case(Some(_)) => "case",
            StmtKind::Case(None) => "default",
            StmtKind::Break => "break",
            StmtKind::Continue => "continue",
            StmtKind::Discard => "discard",
            StmtKind::Return(_) => "return",
            StmtKind::Null => "null statement",
        }
    }
}

impl ExprKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Var(_) => "variable",
            ExprKind::Int(_) | ExprKind::UInt(_) | ExprKind::Float(_) | ExprKind::Bool(_) => {
                "literal"
            }
            ExprKind::Binary { .. } => "binary",
            ExprKind::Unary { .. } => "unary",
            ExprKind::Paren(_) => "parenthesis",
            ExprKind::Call { .. } => "call",
            ExprKind::Constructor { .. } => "constructor",
            ExprKind::Member { .. } => "member lookup",
            ExprKind::Index { .. } => "index",
            ExprKind::Ternary { .. } => "ternary",
        }
    }
}

impl Stmt {
    pub fn has_child(&self, child: NodeId) -> bool {
        self.child_stmts().iter().any(|s| s.id == child)
    }

    /// Replace the direct child statement `child`, returning the old one.
    ///
    /// Only statements that own statements support this. Anything else is
    /// a `ReplaceUnsupported` error.
    pub fn replace_child(&mut self, child: NodeId, new: Stmt) -> Result<Stmt, GlFuzzError> {
        let parent = self.id;
        match &mut self.kind {
            StmtKind::Block(_)
            | StmtKind::Switch { .. }
            | StmtKind::If { .. }
            | StmtKind::For { .. }
            | StmtKind::While { .. }
            | StmtKind::Do { .. } => {}
            other => {
                return Err(GlFuzzError::ReplaceUnsupported {
                    parent_kind: other.name(),
                })
            }
        }
        match self.child_stmts_mut().into_iter().find(|s| s.id == child) {
            Some(slot) => Ok(std::mem::replace(slot, new)),
            None => Err(GlFuzzError::ChildDoesNotExist { parent, child }),
        }
    }
}

impl Expr {
    pub fn has_child(&self, child: NodeId) -> bool {
        self.children().iter().any(|e| e.id == child)
    }

    /// Replace the direct child expression `child`, returning the old one.
    pub fn replace_child(&mut self, child: NodeId, new: Expr) -> Result<Expr, GlFuzzError> {
        let parent = self.id;
        if self.children().is_empty() {
            return Err(GlFuzzError::ReplaceUnsupported {
                parent_kind: self.kind.name(),
            });
        }
        match self.children_mut().into_iter().find(|e| e.id == child) {
            Some(slot) => Ok(std::mem::replace(slot, new)),
            None => Err(GlFuzzError::ChildDoesNotExist { parent, child }),
        }
    }

    pub fn find_mut(&mut self, id: NodeId) -> Option<&mut Expr> {
        if self.id == id {
            return Some(self);
        }
        self.children_mut().into_iter().find_map(|c| c.find_mut(id))
    }

    pub fn find(&self, id: NodeId) -> Option<&Expr> {
        if self.id == id {
            return Some(self);
        }
        self.children().into_iter().find_map(|c| c.find(id))
    }
}

impl Stmt {
    pub fn find_stmt_mut(&mut self, id: NodeId) -> Option<&mut Stmt> {
        if self.id == id {
            return Some(self);
        }
        self.child_stmts_mut()
            .into_iter()
            .find_map(|s| s.find_stmt_mut(id))
    }

    pub fn find_stmt(&self, id: NodeId) -> Option<&Stmt> {
        if self.id == id {
            return Some(self);
        }
        self.child_stmts().into_iter().find_map(|s| s.find_stmt(id))
    }

    pub fn find_expr_mut(&mut self, id: NodeId) -> Option<&mut Expr> {
        // Borrow the two child lists one after the other.
        if self.exprs().iter().any(|e| e.find(id).is_some()) {
            return self.exprs_mut().into_iter().find_map(|e| e.find_mut(id));
        }
        self.child_stmts_mut()
            .into_iter()
            .find_map(|s| s.find_expr_mut(id))
    }

    pub fn find_block_mut(&mut self, owner: NodeId) -> Option<&mut Block> {
        if self.id == owner {
            return self.owned_block_mut();
        }
        self.child_stmts_mut()
            .into_iter()
            .find_map(|s| s.find_block_mut(owner))
    }

    pub fn find_variables_mut(&mut self, id: NodeId) -> Option<&mut VariablesDeclaration> {
        if let StmtKind::Decl(_) = self.kind {
            return match &mut self.kind {
                StmtKind::Decl(d) if d.id == id => Some(d),
                _ => None,
            };
        }
        self.child_stmts_mut()
            .into_iter()
            .find_map(|s| s.find_variables_mut(id))
    }

    fn locate(&self, id: NodeId) -> Option<(NodeId, usize)> {
        if let StmtKind::Block(b) | StmtKind::Switch { body: b, .. } = &self.kind {
            if let Some(i) = b.stmts.iter().position(|s| s.id == id) {
                return Some((self.id, i));
            }
        }
        self.child_stmts().into_iter().find_map(|s| s.locate(id))
    }
}

impl Block {
    fn locate(&self, owner: NodeId, id: NodeId) -> Option<(NodeId, usize)> {
        if let Some(i) = self.stmts.iter().position(|s| s.id == id) {
            return Some((owner, i));
        }
        self.stmts.iter().find_map(|s| s.locate(id))
    }
}

impl TranslationUnit {
    pub fn find_stmt(&self, id: NodeId) -> Option<&Stmt> {
        self.functions()
            .flat_map(|f| f.body.stmts.iter())
            .find_map(|s| s.find_stmt(id))
    }

    pub fn find_stmt_mut(&mut self, id: NodeId) -> Option<&mut Stmt> {
        self.functions_mut()
            .flat_map(|f| f.body.stmts.iter_mut())
            .find_map(|s| s.find_stmt_mut(id))
    }

    pub fn find_expr(&self, id: NodeId) -> Option<&Expr> {
        for decl in &self.decls {
            let found = match decl {
                Decl::Function(f) => f.body.stmts.iter().find_map(|s| find_expr_in_stmt(s, id)),
                Decl::Variables(v) => v
                    .decls
                    .iter()
                    .filter_map(|i| i.initializer.as_ref())
                    .find_map(|e| e.find(id)),
                _ => None,
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }

    pub fn find_expr_mut(&mut self, id: NodeId) -> Option<&mut Expr> {
        for decl in self.decls.iter_mut() {
            let found = match decl {
                Decl::Function(f) => f
                    .body
                    .stmts
                    .iter_mut()
                    .find_map(|s| s.find_expr_mut(id)),
                Decl::Variables(v) => v
                    .decls
                    .iter_mut()
                    .filter_map(|i| i.initializer.as_mut())
                    .find_map(|e| e.find_mut(id)),
                _ => None,
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }

    /// Block owned by the function, block statement or switch `owner`.
    pub fn find_block_mut(&mut self, owner: NodeId) -> Option<&mut Block> {
        for f in self.functions_mut() {
            if f.id == owner {
                return Some(&mut f.body);
            }
            if let Some(b) = f.body.stmts.iter_mut().find_map(|s| s.find_block_mut(owner)) {
                return Some(b);
            }
        }
        None
    }

    /// Owning block and index of a statement that sits directly in a block.
    pub fn locate_stmt(&self, id: NodeId) -> Option<(NodeId, usize)> {
        self.functions().find_map(|f| f.body.locate(f.id, id))
    }

    /// Local or global declaration with the given id.
    pub fn find_variables_mut(&mut self, id: NodeId) -> Option<&mut VariablesDeclaration> {
        for decl in self.decls.iter_mut() {
            match decl {
                Decl::Variables(v) if v.id == id => return Some(v),
                Decl::Function(f) => {
                    if let Some(v) = f
                        .body
                        .stmts
                        .iter_mut()
                        .find_map(|s| s.find_variables_mut(id))
                    {
                        return Some(v);
                    }
                }
                _ => {}
            }
        }
        None
    }

    pub fn function_by_id_mut(&mut self, id: NodeId) -> Option<&mut FunctionDefinition> {
        self.functions_mut().find(|f| f.id == id)
    }

    pub fn function_by_id(&self, id: NodeId) -> Option<&FunctionDefinition> {
        self.functions().find(|f| f.id == id)
    }

    /// Remove the statement `id` from its block, returning it.
    pub fn remove_stmt(&mut self, id: NodeId) -> Option<Stmt> {
        let (owner, index) = self.locate_stmt(id)?;
        let block = self.find_block_mut(owner)?;
        Some(block.stmts.remove(index))
    }

    /// Insert statements before the statement `id` in its block.
    pub fn insert_before(&mut self, id: NodeId, stmts: Vec<Stmt>) -> bool {
        let (owner, index) = match self.locate_stmt(id) {
            Some(found) => found,
            None => return false,
        };
        match self.find_block_mut(owner) {
            Some(block) => {
                block.stmts.splice(index..index, stmts);
                true
            }
            None => false,
        }
    }

    /// Insert statements right after the statement `id` in its block.
    pub fn insert_after(&mut self, id: NodeId, stmts: Vec<Stmt>) -> bool {
        let (owner, index) = match self.locate_stmt(id) {
            Some(found) => found,
            None => return false,
        };
        match self.find_block_mut(owner) {
            Some(block) => {
                block.stmts.splice(index + 1..index + 1, stmts);
                true
            }
            None => false,
        }
    }

    /// Replace the statement `id`, wherever it sits, returning the old one.
    pub fn replace_stmt(&mut self, id: NodeId, new: Stmt) -> Option<Stmt> {
        let slot = self.find_stmt_mut(id)?;
        Some(std::mem::replace(slot, new))
    }

    /// Replace the expression `id`, wherever it sits, returning the old one.
    pub fn replace_expr(&mut self, id: NodeId, new: Expr) -> Option<Expr> {
        let slot = self.find_expr_mut(id)?;
        Some(std::mem::replace(slot, new))
    }
}

fn find_expr_in_stmt(s: &Stmt, id: NodeId) -> Option<&Expr> {
    s.exprs()
        .into_iter()
        .find_map(|e| e.find(id))
        .or_else(|| {
            s.child_stmts()
                .into_iter()
                .find_map(|c| find_expr_in_stmt(c, id))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    #[test]
    fn test_replace_child_rules() {
        let mut tu = test::parse_frag("void main() { if (true) { } int a = 1 + 2; }");
        let main = tu.main_function_mut().unwrap();
        let then_id = match &main.body.stmts[0].kind {
            StmtKind::If { then_stmt, .. } => then_stmt.id,
            _ => unreachable!(),
        };
        let old = main.body.stmts[0]
            .replace_child(then_id, Stmt::new(StmtKind::Null))
            .unwrap();
        assert_eq!(old.id, then_id);
        let missing = main.body.stmts[0].replace_child(then_id, Stmt::new(StmtKind::Null));
        assert!(matches!(missing, Err(GlFuzzError::ChildDoesNotExist { .. })));
        let decl = &mut main.body.stmts[1];
        let unsupported = decl.replace_child(then_id, Stmt::new(StmtKind::Null));
        assert!(matches!(
            unsupported,
            Err(GlFuzzError::ReplaceUnsupported { parent_kind: "declaration" })
        ));
        test::assert_same_program(&tu, "void main() { if (true) ; int a = 1 + 2; }");
    }

    #[test]
    fn test_locate_and_insert() {
        let mut tu = test::parse_frag("void main() { int a; { a = 1; } }");
        let inner = {
            let main = tu.main_function().unwrap();
            main.body.stmts[1].as_block().unwrap().stmts[0].id
        };
        let (owner, index) = tu.locate_stmt(inner).unwrap();
        assert_eq!(owner, tu.main_function().unwrap().body.stmts[1].id);
        assert_eq!(index, 0);
        assert!(tu.insert_before(inner, vec![Stmt::new(StmtKind::Null)]));
        test::assert_same_program(&tu, "void main() { int a; { ; a = 1; } }");
        assert!(tu.remove_stmt(inner).is_some());
        test::assert_same_program(&tu, "void main() { int a; { ; } }");
    }
}
