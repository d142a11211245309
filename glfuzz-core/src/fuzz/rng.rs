use rand::{
    distributions::uniform::{SampleRange, SampleUniform},
    prelude::*,
    rngs::StdRng,
};

/// Random source owned by one session. Seeded explicitly so that a run can
/// be replayed.
#[derive(Debug, Clone)]
pub struct FuzzRng {
    seed: u64,
    inner: StdRng,
}

impl FuzzRng {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            inner: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[inline]
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.inner.gen_range(range)
    }

    /// Uniform value in `0..bound`; 0 when `bound` is 0.
    #[inline]
    pub fn below(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        self.inner.gen_range(0..bound)
    }

    #[inline]
    pub fn prob(&mut self, p: f64) -> bool {
        self.inner.gen_bool(p)
    }

    #[inline]
    pub fn likely(&mut self) -> bool {
        self.prob(0.65)
    }

    #[inline]
    pub fn coin(&mut self) -> bool {
        self.prob(0.50)
    }

    #[inline]
    pub fn unlikely(&mut self) -> bool {
        self.prob(0.35)
    }

    #[inline]
    pub fn rarely(&mut self) -> bool {
        self.prob(0.10)
    }

    pub fn choose<'a, T>(&mut self, list: &'a [T]) -> Option<&'a T> {
        list.choose(&mut self.inner)
    }

    pub fn choose_index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(self.below(len))
    }

    pub fn shuffle<T>(&mut self, list: &mut [T]) {
        list.shuffle(&mut self.inner)
    }
}

#[test]
fn test_seeded_rng_replays() {
    let mut a = FuzzRng::new(42);
    let mut b = FuzzRng::new(42);
    let xs: Vec<usize> = (0..16).map(|_| a.below(100)).collect();
    let ys: Vec<usize> = (0..16).map(|_| b.below(100)).collect();
    assert_eq!(xs, ys);
    assert_eq!(a.below(0), 0);
    assert_eq!(a.choose_index(0), None);
    assert!(a.choose::<u8>(&[]).is_none());
}
