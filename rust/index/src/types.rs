/// Result of a single k-NN query: corpus positions ordered from most to
/// least similar, with their cosine similarities.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Neighbors {
    pub indices: Vec<usize>,
    pub similarities: Vec<f32>,
}

impl Neighbors {
    pub fn new(indices: Vec<usize>, similarities: Vec<f32>) -> Self {
        debug_assert_eq!(indices.len(), similarities.len());
        Neighbors {
            indices,
            similarities,
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

impl FromIterator<(usize, f32)> for Neighbors {
    fn from_iter<I: IntoIterator<Item = (usize, f32)>>(iter: I) -> Self {
        let (indices, similarities) = iter.into_iter().unzip();
        Neighbors {
            indices,
            similarities,
        }
    }
}
