use smallvec::SmallVec;

/// Upper bound on the length of a step sequence.
pub const MAX_SEQUENCE_LEN: usize = 6;

/// Geometric growth stages between the endpoints.
const GROWTH_STAGES: i32 = 4;

pub type StepSequence = SmallVec<[usize; MAX_SEQUENCE_LEN]>;

/// Lattice resolutions spanning `[min_steps, max_steps]` on a near-geometric scale.
///
/// Starts at `min_steps`, grows by `(max/min)^(1/4)` (floored, duplicates skipped)
/// for four stages, then appends `max_steps` unconditionally. The trailing
/// append can repeat a value the growth already reached.
pub fn generate(min_steps: usize, max_steps: usize) -> StepSequence {
    let ratio = (max_steps as f64 / min_steps as f64).powf(1.0 / GROWTH_STAGES as f64);

    let mut steps = StepSequence::new();
    steps.push(min_steps);
    for _ in 0..GROWTH_STAGES {
        let last = steps[steps.len() - 1];
        let next = (last as f64 * ratio).floor() as usize;
        if next > last {
            steps.push(next);
        }
    }
    steps.push(max_steps);
    steps
}
