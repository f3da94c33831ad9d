//! In-band benchmark markers.
//!
//! Benchmark support code brackets its timed region with two fixed
//! four-instruction sequences of `addi a0, a0, imm`, spelling `EMBE` for
//! start and `COSM` for stop. The detector watches the retiring instruction
//! stream and raises a one-shot event when either sequence completes.

use std::collections::VecDeque;

use crate::Instruction;

/// Number of instructions in a marker sequence.
pub const MAGIC_LEN: usize = 4;

/// `addi a0, a0, {'E', 'M', 'B', 'E'}`.
pub const MAGIC_START: [Instruction; MAGIC_LEN] =
    [0x0455_0513, 0x04d5_0513, 0x0425_0513, 0x0455_0513];

/// `addi a0, a0, {'C', 'O', 'S', 'M'}`.
pub const MAGIC_STOP: [Instruction; MAGIC_LEN] =
    [0x0435_0513, 0x04f5_0513, 0x0535_0513, 0x04d5_0513];

/// Bounded history of the most recent distinct retired instructions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatternWindow {
    insts: VecDeque<Instruction>,
}

impl PatternWindow {
    /// Creates an empty window.
    #[must_use]
    pub fn new() -> Self {
        Self {
            insts: VecDeque::with_capacity(MAGIC_LEN),
        }
    }

    /// Pushes `inst` unless it repeats the most recent entry.
    ///
    /// Returns `true` when the window changed. The oldest entry is evicted
    /// once the window holds [`MAGIC_LEN`] instructions.
    pub fn push_distinct(&mut self, inst: Instruction) -> bool {
        if self.insts.back() == Some(&inst) {
            return false;
        }
        if self.insts.len() == MAGIC_LEN {
            self.insts.pop_front();
        }
        self.insts.push_back(inst);
        true
    }

    /// Returns `true` when the window is full and equals `pattern` positionally.
    #[must_use]
    pub fn matches(&self, pattern: &[Instruction; MAGIC_LEN]) -> bool {
        self.insts.len() == MAGIC_LEN && self.insts.iter().eq(pattern.iter())
    }

    /// Most recently pushed instruction.
    #[must_use]
    pub fn last(&self) -> Option<Instruction> {
        self.insts.back().copied()
    }

    /// Number of buffered instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.insts.len()
    }

    /// Returns `true` before the first instruction has been observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }
}

/// Edge-detecting watcher for the start and stop marker sequences.
///
/// Events are single-outstanding: a second match before the first is
/// consumed is absorbed into the same pending event.
#[derive(Debug, Clone, Default)]
pub struct MagicPatternDetector {
    window: PatternWindow,
    needs_reset: bool,
    needs_emit_cycle_count: bool,
}

impl MagicPatternDetector {
    /// Creates a detector with an empty window and no pending events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Observes the instruction retiring this cycle.
    ///
    /// Patterns are only compared when the window changes, so an instruction
    /// that stays current for several cycles completes a marker once.
    pub fn observe(&mut self, inst: Instruction) {
        if !self.window.push_distinct(inst) {
            return;
        }
        if self.window.matches(&MAGIC_START) {
            self.needs_reset = true;
        }
        if self.window.matches(&MAGIC_STOP) {
            self.needs_emit_cycle_count = true;
        }
    }

    /// Returns and clears the pending start event.
    pub fn consume_start_event(&mut self) -> bool {
        std::mem::take(&mut self.needs_reset)
    }

    /// Returns and clears the pending stop event.
    pub fn consume_stop_event(&mut self) -> bool {
        std::mem::take(&mut self.needs_emit_cycle_count)
    }

    /// Current instruction history.
    #[must_use]
    pub const fn window(&self) -> &PatternWindow {
        &self.window
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{MagicPatternDetector, PatternWindow, MAGIC_LEN, MAGIC_START, MAGIC_STOP};

    const NOP: u32 = 0x0000_0013;

    fn feed(detector: &mut MagicPatternDetector, insts: &[u32]) {
        for inst in insts {
            detector.observe(*inst);
        }
    }

    #[test]
    fn repeated_observation_is_pushed_once() {
        let mut window = PatternWindow::new();
        assert!(window.push_distinct(NOP));
        assert!(!window.push_distinct(NOP));
        assert!(!window.push_distinct(NOP));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn window_evicts_oldest_entry() {
        let mut window = PatternWindow::new();
        for inst in 1..=5 {
            window.push_distinct(inst);
        }
        assert_eq!(window.len(), MAGIC_LEN);
        assert!(window.matches(&[2, 3, 4, 5]));
        assert_eq!(window.last(), Some(5));
    }

    #[test]
    fn partial_window_never_matches() {
        let mut window = PatternWindow::new();
        for inst in &MAGIC_START[1..] {
            window.push_distinct(*inst);
        }
        assert!(!window.matches(&MAGIC_START));
    }

    #[test]
    fn start_sequence_raises_one_start_event() {
        let mut detector = MagicPatternDetector::new();
        feed(&mut detector, &MAGIC_START);

        assert!(detector.consume_start_event());
        assert!(!detector.consume_start_event());
        assert!(!detector.consume_stop_event());
    }

    #[test]
    fn stop_sequence_raises_one_stop_event() {
        let mut detector = MagicPatternDetector::new();
        feed(&mut detector, &[NOP, NOP]);
        feed(&mut detector, &MAGIC_STOP);

        assert!(detector.consume_stop_event());
        assert!(!detector.consume_stop_event());
        assert!(!detector.consume_start_event());
    }

    #[test]
    fn repeats_inside_sequence_still_match_once() {
        let mut detector = MagicPatternDetector::new();
        let [a, b, c, d] = MAGIC_START;
        feed(&mut detector, &[a, b, c, c, d, d, d]);

        assert_eq!(detector.window().len(), MAGIC_LEN);
        assert_eq!(detector.window().last(), Some(d));
        assert!(detector.consume_start_event());
        assert!(!detector.consume_start_event());
    }

    #[test]
    fn lingering_final_instruction_does_not_rematch() {
        let mut detector = MagicPatternDetector::new();
        feed(&mut detector, &MAGIC_STOP);
        assert!(detector.consume_stop_event());

        feed(&mut detector, &[MAGIC_STOP[3]; 8]);
        assert!(!detector.consume_stop_event());
    }

    #[test]
    fn second_match_before_consume_overwrites_instead_of_queueing() {
        let mut detector = MagicPatternDetector::new();
        feed(&mut detector, &MAGIC_START);
        feed(&mut detector, &[NOP]);
        feed(&mut detector, &MAGIC_START);

        assert!(detector.consume_start_event());
        assert!(!detector.consume_start_event());
    }

    #[test]
    fn interrupted_sequence_does_not_match() {
        let mut detector = MagicPatternDetector::new();
        let [a, b, c, d] = MAGIC_START;
        feed(&mut detector, &[a, b, NOP, c, d]);
        assert!(!detector.consume_start_event());
    }

    proptest! {
        #[test]
        fn repetition_count_never_changes_window(
            insts in proptest::collection::vec(any::<u32>(), 1..32),
            repeats in proptest::collection::vec(1usize..5, 32),
        ) {
            let mut once = PatternWindow::new();
            let mut repeated = PatternWindow::new();
            for (inst, times) in insts.iter().zip(&repeats) {
                once.push_distinct(*inst);
                for _ in 0..*times {
                    repeated.push_distinct(*inst);
                }
            }
            prop_assert_eq!(once, repeated);
        }

        #[test]
        fn start_marker_with_arbitrary_stretching_yields_one_event(
            stretch in proptest::collection::vec(1usize..6, MAGIC_LEN),
        ) {
            let mut detector = MagicPatternDetector::new();
            detector.observe(NOP);
            for (inst, times) in MAGIC_START.iter().zip(&stretch) {
                for _ in 0..*times {
                    detector.observe(*inst);
                }
            }
            prop_assert!(detector.consume_start_event());
            prop_assert!(!detector.consume_start_event());
            prop_assert!(!detector.consume_stop_event());
        }
    }
}
