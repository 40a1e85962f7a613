use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::model::QueryRecord;

pub fn sample_queries(
    mut queries: Vec<QueryRecord>,
    sample_size: Option<usize>,
    seed: u64,
) -> Vec<QueryRecord> {
    let Some(sample_size) = sample_size.filter(|size| *size > 0) else {
        return queries;
    };

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    queries.shuffle(&mut rng);
    queries.truncate(sample_size);
    queries
}
