/// Source of fresh numbers for synthetic names. One generator belongs to
/// one session and is passed to every transformation that makes up names.
#[derive(Debug, Default, Clone)]
pub struct IdGenerator {
    next: u32,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start after every number already used in `names` by one of the given
    /// prefixes, so that names made for an existing program do not collide.
    pub fn after_existing<'a>(prefixes: &[&str], names: impl IntoIterator<Item = &'a str>) -> Self {
        let next = names
            .into_iter()
            .flat_map(|n| prefixes.iter().filter_map(move |p| n.strip_prefix(p)))
            .filter_map(|rest| {
                let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse::<u32>().ok()
            })
            .max()
            .map(|n| n + 1)
            .unwrap_or(0);
        Self { next }
    }

    pub fn fresh_id(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}

#[test]
fn test_fresh_ids() {
    let mut ids = IdGenerator::new();
    assert_eq!(ids.fresh_id(), 0);
    assert_eq!(ids.fresh_id(), 1);
    let mut ids = IdGenerator::after_existing(&["GLF_live"], ["GLF_live3x", "GLF_live10_a", "other"]);
    assert_eq!(ids.fresh_id(), 11);
}
