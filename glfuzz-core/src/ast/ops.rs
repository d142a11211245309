use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    LAnd,
    LXor,
    LOr,
    Assign,
    MulAssign,
    DivAssign,
    ModAssign,
    AddAssign,
    SubAssign,
    ShlAssign,
    ShrAssign,
    BitAndAssign,
    BitXorAssign,
    BitOrAssign,
    Comma,
}

const BIN_OPS: [BinOp; 31] = [
    BinOp::Mul,
    BinOp::Div,
    BinOp::Mod,
    BinOp::Add,
    BinOp::Sub,
    BinOp::Shl,
    BinOp::Shr,
    BinOp::Lt,
    BinOp::Gt,
    BinOp::Le,
    BinOp::Ge,
    BinOp::Eq,
    BinOp::Ne,
    BinOp::BitAnd,
    BinOp::BitXor,
    BinOp::BitOr,
    BinOp::LAnd,
    BinOp::LXor,
    BinOp::LOr,
    BinOp::Assign,
    BinOp::MulAssign,
    BinOp::DivAssign,
    BinOp::ModAssign,
    BinOp::AddAssign,
    BinOp::SubAssign,
    BinOp::ShlAssign,
    BinOp::ShrAssign,
    BinOp::BitAndAssign,
    BinOp::BitXorAssign,
    BinOp::BitOrAssign,
    BinOp::Comma,
];

impl BinOp {
    pub fn text(&self) -> &'static str {
        match self {
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::BitAnd => "&",
            Self::BitXor => "^",
            Self::BitOr => "|",
            Self::LAnd => "&&",
            Self::LXor => "^^",
            Self::LOr => "||",
            Self::Assign => "=",
            Self::MulAssign => "*=",
            Self::DivAssign => "/=",
            Self::ModAssign => "%=",
            Self::AddAssign => "+=",
            Self::SubAssign => "-=",
            Self::ShlAssign => "<<=",
            Self::ShrAssign => ">>=",
            Self::BitAndAssign => "&=",
            Self::BitXorAssign => "^=",
            Self::BitOrAssign => "|=",
            Self::Comma => ",",
        }
    }

    pub fn from_text(text: &str) -> Option<Self> {
        BIN_OPS.iter().find(|op| op.text() == text).copied()
    }

    /// Binding strength; larger binds tighter. Assignment and comma are handled
    /// outside of precedence climbing.
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Comma => 1,
            op if op.is_assignment() => 2,
            Self::LOr => 4,
            Self::LXor => 5,
            Self::LAnd => 6,
            Self::BitOr => 7,
            Self::BitXor => 8,
            Self::BitAnd => 9,
            Self::Eq | Self::Ne => 10,
            Self::Lt | Self::Gt | Self::Le | Self::Ge => 11,
            Self::Shl | Self::Shr => 12,
            Self::Add | Self::Sub => 13,
            _ => 14,
        }
    }

    pub fn is_assignment(&self) -> bool {
        matches!(
            self,
            Self::Assign
                | Self::MulAssign
                | Self::DivAssign
                | Self::ModAssign
                | Self::AddAssign
                | Self::SubAssign
                | Self::ShlAssign
                | Self::ShrAssign
                | Self::BitAndAssign
                | Self::BitXorAssign
                | Self::BitOrAssign
        )
    }

    pub fn is_side_effecting(&self) -> bool {
        self.is_assignment()
    }

    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            Self::Lt | Self::Gt | Self::Le | Self::Ge | Self::Eq | Self::Ne
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, Self::LAnd | Self::LOr | Self::LXor)
    }

    /// `&&` and `||` may skip evaluating their right operand.
    pub fn is_short_circuiting(&self) -> bool {
        matches!(self, Self::LAnd | Self::LOr)
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    PreInc,
    PreDec,
    PostInc,
    PostDec,
    Plus,
    Minus,
    /// `!`
    LNot,
    /// `~`
    BitNot,
}

impl UnOp {
    pub fn text(&self) -> &'static str {
        match self {
            Self::PreInc | Self::PostInc => "++",
            Self::PreDec | Self::PostDec => "--",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::LNot => "!",
            Self::BitNot => "~",
        }
    }

    pub fn is_postfix(&self) -> bool {
        matches!(self, Self::PostInc | Self::PostDec)
    }

    pub fn is_side_effecting(&self) -> bool {
        matches!(
            self,
            Self::PreInc | Self::PreDec | Self::PostInc | Self::PostDec
        )
    }
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}
