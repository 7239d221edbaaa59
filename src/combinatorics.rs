//! Index generators for unordered (`combinations`) and ordered
//! (`arrangements`) selections of `k` distinct items out of `n`.

/// Lexicographic k-combinations of `0..n`.
#[derive(Clone, Debug)]
pub struct Combinations {
    n: usize,
    indices: Vec<usize>,
    started: bool,
    done: bool,
}

pub fn combinations(n: usize, k: usize) -> Combinations {
    Combinations {
        n,
        indices: (0..k).collect(),
        started: false,
        done: k > n,
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(self.indices.clone());
        }
        let k = self.indices.len();
        // rightmost position that can still move right
        let mut i = k;
        loop {
            if i == 0 {
                self.done = true;
                return None;
            }
            i -= 1;
            if self.indices[i] < self.n - k + i {
                break;
            }
        }
        self.indices[i] += 1;
        for j in i + 1..k {
            self.indices[j] = self.indices[j - 1] + 1;
        }
        Some(self.indices.clone())
    }
}

/// Rearranges `v` into its next lexicographic permutation, returning `false`
/// once `v` is the last one.
fn next_permutation(v: &mut [usize]) -> bool {
    if v.len() < 2 {
        return false;
    }
    let mut i = v.len() - 1;
    while i > 0 && v[i - 1] >= v[i] {
        i -= 1;
    }
    if i == 0 {
        return false;
    }
    let mut j = v.len() - 1;
    while v[j] <= v[i - 1] {
        j -= 1;
    }
    v.swap(i - 1, j);
    v[i..].reverse();
    true
}

/// Ordered selections of `k` distinct items of `0..n`: every combination in
/// lexicographic order, each followed through all of its permutations.
#[derive(Clone, Debug)]
pub struct Arrangements {
    combinations: Combinations,
    current: Option<Vec<usize>>,
}

pub fn arrangements(n: usize, k: usize) -> Arrangements {
    Arrangements {
        combinations: combinations(n, k),
        current: None,
    }
}

impl Iterator for Arrangements {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if let Some(current) = self.current.as_mut() {
            if next_permutation(current) {
                return Some(current.clone());
            }
        }
        let next = self.combinations.next()?;
        self.current = Some(next.clone());
        Some(next)
    }
}
