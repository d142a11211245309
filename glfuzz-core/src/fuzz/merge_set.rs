use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::*;
use crate::config::MAX_VECTOR_WIDTH;

pub const MERGED_PREFIX: &str = "GLF_merged";

static MERGED_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^GLF_merged(\d+)((?:_\d+_\d+_\d+)*)(\D.*)$").unwrap_or_else(|err| {
        panic!("merged name pattern is invalid: {err}");
    })
});

/// A variable that may join a merge set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeCandidate {
    pub name: String,
    pub ty: BasicType,
    /// The declaration statement and the declarator of the variable.
    pub decl_stmt: NodeId,
    pub decl: NodeId,
    pub info: NodeId,
}

/// Variables of one scope packed into a single vector.
#[derive(Debug, Clone)]
pub struct MergeSet {
    element: BasicType,
    entries: Vec<MergeCandidate>,
}

impl MergeSet {
    pub fn new(first: MergeCandidate) -> Self {
        Self {
            element: first.ty.element_type(),
            entries: vec![first],
        }
    }

    /// Same element type, not from a declaration already in the set, and
    /// room left in the vector.
    pub fn can_accept(&self, c: &MergeCandidate) -> bool {
        c.ty.element_type() == self.element
            && !self.entries.iter().any(|e| e.decl == c.decl)
            && self.width() + c.ty.num_elements() <= MAX_VECTOR_WIDTH
    }

    pub fn add(&mut self, c: MergeCandidate) {
        debug_assert!(self.can_accept(&c));
        self.entries.push(c);
    }

    pub fn entries(&self) -> &[MergeCandidate] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of vector components used.
    pub fn width(&self) -> usize {
        self.entries.iter().map(|e| e.ty.num_elements()).sum()
    }

    pub fn merged_type(&self) -> Option<BasicType> {
        BasicType::make_vector(self.element, self.width())
    }

    fn offset_of(&self, index: usize) -> usize {
        self.entries[..index]
            .iter()
            .map(|e| e.ty.num_elements())
            .sum()
    }

    /// `GLF_merged{n}` then `_{offset}_{width}_{namelen}` per entry, then
    /// the entry names.
    pub fn merged_name(&self) -> String {
        let mut name = format!("{MERGED_PREFIX}{}", self.entries.len());
        for (i, e) in self.entries.iter().enumerate() {
            name.push_str(&format!(
                "_{}_{}_{}",
                self.offset_of(i),
                e.ty.num_elements(),
                e.name.len()
            ));
        }
        for e in &self.entries {
            name.push_str(&e.name);
        }
        name
    }

    /// Swizzle selecting the components of entry `index`.
    pub fn swizzle(&self, index: usize) -> String {
        swizzle_for(self.offset_of(index), self.entries[index].ty.num_elements())
    }
}

/// One variable recovered from a merged vector name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedComponent {
    pub name: String,
    pub offset: usize,
    pub width: usize,
}

impl MergedComponent {
    pub fn swizzle(&self) -> String {
        swizzle_for(self.offset, self.width)
    }
}

pub fn swizzle_for(offset: usize, width: usize) -> String {
    "xyzw".chars().skip(offset).take(width).collect()
}

/// Decode a name produced by [`MergeSet::merged_name`].
pub fn decode_merged_name(name: &str) -> Option<Vec<MergedComponent>> {
    let caps = MERGED_NAME.captures(name)?;
    let count: usize = caps[1].parse().ok()?;
    let numbers: Vec<usize> = caps[2]
        .split('_')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect::<Option<_>>()?;
    if numbers.len() != count * 3 {
        return None;
    }
    let mut names = &caps[3];
    let mut out = Vec::with_capacity(count);
    for triple in numbers.chunks(3) {
        let (offset, width, len) = (triple[0], triple[1], triple[2]);
        if len > names.len() || offset + width > MAX_VECTOR_WIDTH || !names.is_char_boundary(len) {
            return None;
        }
        let (head, rest) = names.split_at(len);
        out.push(MergedComponent {
            name: head.to_string(),
            offset,
            width,
        });
        names = rest;
    }
    names.is_empty().then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, ty: BasicType, decl: NodeId) -> MergeCandidate {
        MergeCandidate {
            name: name.to_string(),
            ty,
            decl_stmt: NodeId::fresh(),
            decl,
            info: NodeId::fresh(),
        }
    }

    #[test]
    fn test_capacity_and_same_declaration() {
        let d1 = NodeId::fresh();
        let d2 = NodeId::fresh();
        let mut set = MergeSet::new(candidate("a", BasicType::Vec2, d1));
        assert!(!set.can_accept(&candidate("b", BasicType::Float, d1)));
        assert!(!set.can_accept(&candidate("b", BasicType::Int, d2)));
        assert!(!set.can_accept(&candidate("b", BasicType::Vec3, d2)));
        set.add(candidate("bb", BasicType::Vec2, d2));
        assert_eq!(set.width(), 4);
        assert!(!set.can_accept(&candidate("c", BasicType::Float, NodeId::fresh())));
        assert_eq!(set.merged_type(), Some(BasicType::Vec4));
        assert_eq!(set.swizzle(1), "zw");
    }

    #[test]
    fn test_name_decodes_back() {
        let mut set = MergeSet::new(candidate("a", BasicType::Float, NodeId::fresh()));
        set.add(candidate("_bb", BasicType::Vec2, NodeId::fresh()));
        let name = set.merged_name();
        assert_eq!(name, "GLF_merged2_0_1_1_1_2_3a_bb");
        let parts = decode_merged_name(&name).unwrap();
        assert_eq!(parts[1].name, "_bb");
        assert_eq!(parts[1].swizzle(), "yz");
        assert_eq!(decode_merged_name("GLF_merged2_0_1_1x"), None);
        assert_eq!(decode_merged_name("merged"), None);
    }
}
