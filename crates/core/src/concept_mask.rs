//! Token-aligned concept mask.
//!
//! One `i32` per annotation token:
//!
//! | value | meaning |
//! |---|---|
//! | `-1` | no mark |
//! | `0..n` | index into the annotation's `concept_ids` |
//! | `<= -2` | mention of the object's label, encoded as `-label_index - 2` |
//!
//! Cells sharing a concept index are contiguous and spans appear in
//! ascending index order from left to right.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::DbId;

pub const NO_MARK: i32 = -1;

/// Decoded value of one mask cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskCell {
    Empty,
    Concept(usize),
    Label(i64),
}

/// Label-mention marker for `label_index`. Fails when the index is
/// negative or its marker does not fit in an `i32` cell.
pub fn label_marker(label_index: i64) -> CoreResult<i32> {
    i32::try_from(label_index)
        .ok()
        .filter(|&index| index >= 0)
        .and_then(|index| (-index).checked_sub(2))
        .ok_or_else(|| CoreError::Validation(format!("label index {label_index} cannot be encoded in a concept mask")))
}

fn concept_cell(index: usize) -> CoreResult<i32> {
    i32::try_from(index)
        .map_err(|_| CoreError::Validation(format!("concept index {index} cannot be encoded in a concept mask")))
}

/// A contiguous run of one concept index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConceptSpan {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl ConceptSpan {
    fn overlaps(&self, range: &Range<usize>) -> bool {
        self.start < range.end && range.start < self.end
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConceptMask(Vec<i32>);

impl ConceptMask {
    /// All cells unmarked.
    pub fn empty(len: usize) -> Self {
        Self(vec![NO_MARK; len])
    }

    pub fn from_cells(cells: Vec<i32>) -> Self {
        Self(cells)
    }

    /// Mark concept spans with their position in `concept_spans`, then label
    /// spans wherever no concept mark is present.
    pub fn build(
        len: usize,
        concept_spans: &[Range<usize>],
        label_spans: &[Range<usize>],
        label_index: i64,
    ) -> CoreResult<Self> {
        let marker = label_marker(label_index)?;
        let mut mask = Self::empty(len);
        for (k, span) in concept_spans.iter().enumerate() {
            let k = concept_cell(k)?;
            for cell in mask.cells_mut(span) {
                *cell = k;
            }
        }
        for span in label_spans {
            for cell in mask.cells_mut(span) {
                if *cell < 0 {
                    *cell = marker;
                }
            }
        }
        Ok(mask)
    }

    fn cells_mut(&mut self, range: &Range<usize>) -> &mut [i32] {
        let end = range.end.min(self.0.len());
        let start = range.start.min(end);
        &mut self.0[start..end]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<i32> {
        self.0
    }

    pub fn cell(&self, position: usize) -> Option<MaskCell> {
        self.0.get(position).map(|&value| match value {
            v if v >= 0 => MaskCell::Concept(v as usize),
            NO_MARK => MaskCell::Empty,
            v => MaskCell::Label(-i64::from(v) - 2),
        })
    }

    /// Concept spans in left-to-right order.
    pub fn spans(&self) -> Vec<ConceptSpan> {
        let mut spans: Vec<ConceptSpan> = Vec::new();
        for (position, &value) in self.0.iter().enumerate() {
            if value < 0 {
                continue;
            }
            match spans.last_mut() {
                Some(last) if last.index == value as usize && last.end == position => {
                    last.end = position + 1;
                }
                _ => spans.push(ConceptSpan {
                    index: value as usize,
                    start: position,
                    end: position + 1,
                }),
            }
        }
        spans
    }

    /// Check the mask against its annotation's tokens and concept ids.
    pub fn validate(&self, token_count: usize, concept_count: usize) -> CoreResult<()> {
        if self.0.len() != token_count {
            return Err(CoreError::Validation(format!(
                "concept mask has {} cells for {} tokens",
                self.0.len(),
                token_count
            )));
        }
        let spans = self.spans();
        for (expected, span) in spans.iter().enumerate() {
            if span.index != expected || span.index >= concept_count {
                return Err(CoreError::Validation(format!(
                    "concept span {} at [{}, {}) is out of order or unreferenced",
                    span.index, span.start, span.end
                )));
            }
        }
        if spans.len() != concept_count {
            return Err(CoreError::Validation(format!(
                "{} concept ids for {} concept spans",
                concept_count,
                spans.len()
            )));
        }
        Ok(())
    }

    /// Place `concept_id` over `range`, replacing overlapped concepts.
    ///
    /// Spans are renumbered left to right so the result stays contiguous and
    /// ascending. Label marks inside `range` are overwritten; overlapped
    /// concept cells outside `range` are cleared.
    pub fn merge_range(
        &self,
        concept_ids: &[DbId],
        range: Range<usize>,
        concept_id: DbId,
    ) -> CoreResult<(ConceptMask, Vec<DbId>)> {
        if range.start >= range.end || range.end > self.0.len() {
            return Err(CoreError::Validation(format!(
                "range [{}, {}) is outside 0..{}",
                range.start,
                range.end,
                self.0.len()
            )));
        }

        let mut placed: Vec<(Range<usize>, DbId)> = Vec::new();
        for span in self.spans() {
            if span.overlaps(&range) {
                continue;
            }
            let id = concept_ids.get(span.index).copied().ok_or_else(|| {
                CoreError::Internal(format!("mask references missing concept {}", span.index))
            })?;
            placed.push((span.start..span.end, id));
        }
        placed.push((range, concept_id));
        placed.sort_by_key(|(r, _)| r.start);

        let mut cells: Vec<i32> = self
            .0
            .iter()
            .map(|&v| if v >= 0 { NO_MARK } else { v })
            .collect();
        let mut ids = Vec::with_capacity(placed.len());
        for (k, (span, id)) in placed.into_iter().enumerate() {
            let k = concept_cell(k)?;
            for cell in &mut cells[span] {
                *cell = k;
            }
            ids.push(id);
        }
        Ok((ConceptMask(cells), ids))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn fox_mask() -> ConceptMask {
        ConceptMask::build(10, &[8..10], &[3..4], 3).unwrap()
    }

    #[test]
    fn build_encodes_concepts_and_label_mentions() {
        assert_eq!(
            fox_mask().as_slice(),
            &[-1, -1, -1, -5, -1, -1, -1, -1, 0, 0]
        );
    }

    #[test]
    fn label_marks_never_overwrite_concepts() {
        let mask = ConceptMask::build(4, &[1..3], &[0..4], 0).unwrap();
        assert_eq!(mask.as_slice(), &[-2, 0, 0, -2]);
    }

    #[test]
    fn label_marker_rejects_indices_outside_i32() {
        assert_eq!(label_marker(0).unwrap(), -2);
        assert_eq!(label_marker(i64::from(i32::MAX) - 2).unwrap(), i32::MIN + 1);
        assert_eq!(label_marker(i64::from(i32::MAX) - 1).unwrap(), i32::MIN);
        assert_matches!(label_marker(i64::from(i32::MAX)), Err(CoreError::Validation(_)));
        assert_matches!(label_marker(1 << 32), Err(CoreError::Validation(_)));
        assert_matches!(label_marker(-1), Err(CoreError::Validation(_)));
        assert_matches!(
            ConceptMask::build(3, &[0..1], &[1..2], i64::MAX),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn cells_decode() {
        let mask = fox_mask();
        assert_eq!(mask.cell(0), Some(MaskCell::Empty));
        assert_eq!(mask.cell(3), Some(MaskCell::Label(3)));
        assert_eq!(mask.cell(9), Some(MaskCell::Concept(0)));
        assert_eq!(mask.cell(10), None);
    }

    #[test]
    fn spans_follow_runs() {
        let mask = ConceptMask::from_cells(vec![0, 0, -1, 1, -2, 2, 2]);
        assert_eq!(
            mask.spans(),
            vec![
                ConceptSpan { index: 0, start: 0, end: 2 },
                ConceptSpan { index: 1, start: 3, end: 4 },
                ConceptSpan { index: 2, start: 5, end: 7 },
            ]
        );
        assert!(mask.validate(7, 3).is_ok());
    }

    #[test]
    fn validate_rejects_length_mismatch_and_dangling_indices() {
        let mask = fox_mask();
        assert_matches!(mask.validate(9, 1), Err(CoreError::Validation(_)));
        assert_matches!(mask.validate(10, 0), Err(CoreError::Validation(_)));
        let interleaved = ConceptMask::from_cells(vec![1, 0]);
        assert_matches!(interleaved.validate(2, 2), Err(CoreError::Validation(_)));
    }

    #[test]
    fn merge_on_identical_range_is_idempotent() {
        let mask = fox_mask();
        let (merged, ids) = mask.merge_range(&[42], 8..10, 42).unwrap();
        assert_eq!(merged, mask);
        assert_eq!(ids, vec![42]);
    }

    #[test]
    fn merge_appends_and_renumbers_by_position() {
        let mask = ConceptMask::from_cells(vec![-1, -1, 0, 0, -1, -1]);
        let (merged, ids) = mask.merge_range(&[7], 0..2, 9).unwrap();
        assert_eq!(merged.as_slice(), &[0, 0, 1, 1, -1, -1]);
        assert_eq!(ids, vec![9, 7]);

        let (merged, ids) = merged.merge_range(&ids, 4..6, 11).unwrap();
        assert_eq!(merged.as_slice(), &[0, 0, 1, 1, 2, 2]);
        assert_eq!(ids, vec![9, 7, 11]);
    }

    #[test]
    fn merge_replaces_overlapped_concepts() {
        let mask = ConceptMask::from_cells(vec![0, 0, -1, 1, 1, 1]);
        let (merged, ids) = mask.merge_range(&[5, 6], 1..4, 8).unwrap();
        assert_eq!(merged.as_slice(), &[-1, 0, 0, 0, -1, -1]);
        assert_eq!(ids, vec![8]);
        assert!(merged.validate(6, ids.len()).is_ok());
    }

    #[test]
    fn merge_overwrites_label_marks_inside_range() {
        let mask = fox_mask();
        let (merged, ids) = mask.merge_range(&[42], 3..4, 17).unwrap();
        assert_eq!(merged.as_slice(), &[-1, -1, -1, 0, -1, -1, -1, -1, 1, 1]);
        assert_eq!(ids, vec![17, 42]);
    }

    #[test]
    fn merge_rejects_bad_ranges() {
        let mask = fox_mask();
        assert_matches!(mask.merge_range(&[1], 5..5, 2), Err(CoreError::Validation(_)));
        assert_matches!(mask.merge_range(&[1], 8..11, 2), Err(CoreError::Validation(_)));
    }
}
