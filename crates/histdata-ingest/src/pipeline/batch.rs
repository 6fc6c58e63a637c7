//! Fixed-size grouping of line entries

/// Collects lines into batches of at most `limit` entries
///
/// Every batch handed out by [`push`](Self::push) is full; only
/// [`finish`](Self::finish) can return a shorter one.
#[derive(Debug)]
pub struct BatchAccumulator {
    limit: usize,
    current: Vec<String>,
}

impl BatchAccumulator {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            current: Vec::with_capacity(limit),
        }
    }

    /// Add one line, returning a batch once `limit` lines have accumulated
    pub fn push(&mut self, line: String) -> Option<Vec<String>> {
        self.current.push(line);
        if self.current.len() >= self.limit {
            Some(std::mem::replace(
                &mut self.current,
                Vec::with_capacity(self.limit),
            ))
        } else {
            None
        }
    }

    /// Hand out whatever is left, if anything
    pub fn finish(self) -> Option<Vec<String>> {
        if self.current.is_empty() {
            None
        } else {
            Some(self.current)
        }
    }
}
