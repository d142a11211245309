//! Render trees as shader text.
//!
//! Output is deterministic and prints parentheses only where the tree holds
//! `Paren` nodes, so parsing rendered text gives back the same tree shape.

use std::fmt::Write as _;

use super::*;

const INDENT: &str = "  ";

pub fn render(tu: &TranslationUnit) -> String {
    let mut p = Printer::default();
    p.unit(tu);
    p.buf
}

pub fn render_stmt(stmt: &Stmt) -> String {
    let mut p = Printer::default();
    p.stmt(stmt);
    p.buf
}

pub fn render_expr(expr: &Expr) -> String {
    let mut buf = String::new();
    write_expr(&mut buf, expr);
    buf
}

#[derive(Default)]
struct Printer {
    buf: String,
    depth: usize,
}

impl Printer {
    fn line_start(&mut self) {
        for _ in 0..self.depth {
            self.buf.push_str(INDENT);
        }
    }

    fn unit(&mut self, tu: &TranslationUnit) {
        if let Some(v) = tu.version {
            let _ = writeln!(self.buf, "#version {}", v.version_string());
            if v.is_webgl() {
                self.buf.push_str("//WebGL\n");
            }
        }
        for decl in &tu.decls {
            self.decl(decl);
        }
    }

    fn decl(&mut self, decl: &Decl) {
        match decl {
            Decl::Directive(text) => {
                self.buf.push_str(text);
                self.buf.push('\n');
            }
            Decl::Precision { precision, ty } => {
                let _ = writeln!(self.buf, "precision {precision} {ty};");
            }
            Decl::Struct(s) => {
                let _ = writeln!(self.buf, "struct {} {{", s.name);
                for field in &s.fields {
                    self.buf.push_str(INDENT);
                    match field.ty.without_qualifiers().kind() {
                        TypeKind::Array { base, size } => {
                            let _ = write!(self.buf, "{base} {}", field.name);
                            write_array_size(&mut self.buf, size);
                        }
                        _ => {
                            let _ = write!(self.buf, "{} {}", field.ty, field.name);
                        }
                    }
                    self.buf.push_str(";\n");
                }
                self.buf.push_str("};\n");
            }
            Decl::Variables(d) => {
                self.variables(d);
                self.buf.push_str(";\n");
            }
            Decl::Prototype(p) => {
                self.prototype(p);
                self.buf.push_str(";\n");
            }
            Decl::Function(f) => {
                self.prototype(&f.prototype);
                self.buf.push('\n');
                self.block(&f.body);
                self.buf.push('\n');
            }
        }
    }

    fn prototype(&mut self, p: &FunctionPrototype) {
        let _ = write!(self.buf, "{} {}(", p.return_type, p.name);
        for (i, param) in p.params.iter().enumerate() {
            if i > 0 {
                self.buf.push_str(", ");
            }
            let _ = write!(self.buf, "{}", param.ty);
            if let Some(name) = &param.name {
                let _ = write!(self.buf, " {name}");
            }
            if let Some(a) = &param.array {
                write_array_size(&mut self.buf, a.size());
            }
        }
        self.buf.push(')');
    }

    /// Print a declaration without the trailing `;`.
    fn variables(&mut self, d: &VariablesDeclaration) {
        let _ = write!(self.buf, "{}", d.base_type);
        for (i, info) in d.decls.iter().enumerate() {
            self.buf.push_str(if i == 0 { " " } else { ", " });
            self.buf.push_str(&info.name);
            if let Some(a) = &info.array {
                write_array_size(&mut self.buf, a.size());
            }
            if let Some(init) = &info.initializer {
                self.buf.push_str(" = ");
                write_expr(&mut self.buf, init);
            }
        }
    }

    /// Print `{ ... }` starting at the current position; the closing brace is
    /// left without a newline.
    fn block(&mut self, b: &Block) {
        self.line_start();
        self.buf.push_str("{\n");
        self.depth += 1;
        for s in &b.stmts {
            self.stmt(s);
        }
        self.depth -= 1;
        self.line_start();
        self.buf.push('}');
    }

    /// Print a statement nested under a control construct.
    fn sub_stmt(&mut self, s: &Stmt) {
        match &s.kind {
            StmtKind::Block(b) => {
                self.block(b);
                self.buf.push('\n');
            }
            _ => {
                self.depth += 1;
                self.stmt(s);
                self.depth -= 1;
            }
        }
    }

    fn stmt(&mut self, s: &Stmt) {
        match &s.kind {
            StmtKind::Block(b) => {
                self.block(b);
                self.buf.push('\n');
            }
            StmtKind::Decl(d) => {
                self.line_start();
                self.variables(d);
                self.buf.push_str(";\n");
            }
            StmtKind::Expr(e) => {
                self.line_start();
                write_expr(&mut self.buf, e);
                self.buf.push_str(";\n");
            }
            StmtKind::If {
                cond,
                then_stmt,
                else_stmt,
            } => {
                self.line_start();
                self.buf.push_str("if (");
                write_expr(&mut self.buf, cond);
                self.buf.push_str(")\n");
                self.sub_stmt(then_stmt);
                if let Some(e) = else_stmt {
                    self.line_start();
                    self.buf.push_str("else\n");
                    self.sub_stmt(e);
                }
            }
            StmtKind::For {
                init,
                cond,
                inc,
                body,
            } => {
                self.line_start();
                self.buf.push_str("for (");
                match &init.kind {
                    StmtKind::Decl(d) => self.variables(d),
                    StmtKind::Expr(e) => write_expr(&mut self.buf, e),
                    _ => {}
                }
                self.buf.push_str("; ");
                if let Some(c) = cond {
                    write_expr(&mut self.buf, c);
                }
                self.buf.push_str("; ");
                if let Some(i) = inc {
                    write_expr(&mut self.buf, i);
                }
                self.buf.push_str(")\n");
                self.sub_stmt(body);
            }
            StmtKind::While { cond, body } => {
                self.line_start();
                self.buf.push_str("while (");
                write_expr(&mut self.buf, cond);
                self.buf.push_str(")\n");
                self.sub_stmt(body);
            }
            StmtKind::Do { body, cond } => {
                self.line_start();
                self.buf.push_str("do\n");
                self.sub_stmt(body);
                self.line_start();
                self.buf.push_str("while (");
                write_expr(&mut self.buf, cond);
                self.buf.push_str(");\n");
            }
            StmtKind::Switch { expr, body } => {
                self.line_start();
                self.buf.push_str("switch (");
                write_expr(&mut self.buf, expr);
                self.buf.push_str(")\n");
                self.block(body);
                self.buf.push('\n');
            }
            StmtKind::Case(label) => {
                self.line_start();
                match label {
                    Some(e) => {
                        self.buf.push_str("case ");
                        write_expr(&mut self.buf, e);
                        self.buf.push_str(":\n");
                    }
                    None => self.buf.push_str("default:\n"),
                }
            }
            StmtKind::Break => self.simple("break;"),
            StmtKind::Continue => self.simple("continue;"),
            StmtKind::Discard => self.simple("discard;"),
            StmtKind::Return(value) => {
                self.line_start();
                match value {
                    Some(e) => {
                        self.buf.push_str("return ");
                        write_expr(&mut self.buf, e);
                        self.buf.push_str(";\n");
                    }
                    None => self.buf.push_str("return;\n"),
                }
            }
            StmtKind::Null => self.simple(";"),
        }
    }

    fn simple(&mut self, text: &str) {
        self.line_start();
        self.buf.push_str(text);
        self.buf.push('\n');
    }
}

fn write_array_size(buf: &mut String, size: Option<u32>) {
    match size {
        Some(n) => {
            let _ = write!(buf, "[{n}]");
        }
        None => buf.push_str("[]"),
    }
}

fn write_args(buf: &mut String, args: &[Expr]) {
    buf.push('(');
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            buf.push_str(", ");
        }
        write_expr(buf, a);
    }
    buf.push(')');
}

fn write_expr(buf: &mut String, e: &Expr) {
    match &e.kind {
        ExprKind::Var(name) => buf.push_str(name),
        ExprKind::Int(text) | ExprKind::UInt(text) | ExprKind::Float(text) => buf.push_str(text),
        ExprKind::Bool(b) => buf.push_str(if *b { "true" } else { "false" }),
        ExprKind::Binary { op, lhs, rhs } => {
            write_expr(buf, lhs);
            if *op == BinOp::Comma {
                buf.push_str(", ");
            } else {
                let _ = write!(buf, " {op} ");
            }
            write_expr(buf, rhs);
        }
        ExprKind::Unary { op, expr } => {
            if op.is_postfix() {
                write_expr(buf, expr);
                buf.push_str(op.text());
            } else {
                buf.push_str(op.text());
                write_expr(buf, expr);
            }
        }
        ExprKind::Paren(inner) => {
            buf.push('(');
            write_expr(buf, inner);
            buf.push(')');
        }
        ExprKind::Call { callee, args } => {
            buf.push_str(callee);
            write_args(buf, args);
        }
        ExprKind::Constructor { ty, args } => {
            let _ = write!(buf, "{ty}");
            write_args(buf, args);
        }
        ExprKind::Member { expr, field } => {
            write_expr(buf, expr);
            buf.push('.');
            buf.push_str(field);
        }
        ExprKind::Index { expr, index } => {
            write_expr(buf, expr);
            buf.push('[');
            write_expr(buf, index);
            buf.push(']');
        }
        ExprKind::Ternary {
            cond,
            then_expr,
            else_expr,
        } => {
            write_expr(buf, cond);
            buf.push_str(" ? ");
            write_expr(buf, then_expr);
            buf.push_str(" : ");
            write_expr(buf, else_expr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_layout() {
        let src = "#version 300 es
precision highp float;
layout(location = 0) out vec4 _GLF_color;
struct S {
  int a[2];
};
float f(in float x, int y[2]);
void main()
{
  int i = 0, j[3];
  for (int k = 0; k < 3; k++)
    i += k;
  if (i > 1)
  {
    i = -(i);
  }
  else
    discard;
  switch (i)
  {
    case 1:
    break;
    default:
  }
  do
  {
  }
  while (false);
}
";
        let tu = parse(src, ShaderKind::Fragment).unwrap();
        assert_eq!(render(&tu), src);
    }

    #[test]
    fn test_webgl_hint_round_trips() {
        let src = "#version 100\n//WebGL\nvoid main()\n{\n}\n";
        let tu = parse(src, ShaderKind::Fragment).unwrap();
        assert_eq!(tu.version, Some(ShadingLanguageVersion::WebGl));
        assert_eq!(render(&tu), src);
    }
}
