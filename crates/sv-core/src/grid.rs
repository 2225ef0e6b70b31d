//! Near-square tiling of `n` items.
//!
//! `n` is rarely a perfect square, so the planner picks between an `r x r`,
//! `r x (r+1)` or `(r+1) x (r+1)` rectangle (with `r = isqrt(n)`) and
//! describes each row as a count of real cells followed by padding cells.

use std::fmt;

use crate::{CoreError, CoreResult};

/// One row of a [`GridLayout`]: `filled` real cells, then `padding` empty ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridRow {
    pub filled: usize,
    pub padding: usize,
}

impl GridRow {
    pub const fn new(filled: usize, padding: usize) -> Self {
        Self { filled, padding }
    }

    pub fn width(&self) -> usize {
        self.filled + self.padding
    }
}

/// A cell position produced by walking a layout in row-major order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    pub row: usize,
    pub column: usize,
    /// Index of the item placed here, `None` for padding.
    pub item: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridLayout {
    rows: Vec<GridRow>,
}

impl GridLayout {
    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.iter().map(GridRow::width).max().unwrap_or(0)
    }

    pub fn filled_count(&self) -> usize {
        self.rows.iter().map(|r| r.filled).sum()
    }

    pub fn padding_count(&self) -> usize {
        self.rows.iter().map(|r| r.padding).sum()
    }

    /// Every cell in row-major order; items are numbered in placement order.
    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        let mut next_item = 0usize;
        self.rows.iter().enumerate().flat_map(move |(row, row_shape)| {
            let first = next_item;
            next_item += row_shape.filled;
            (0..row_shape.width()).map(move |column| Slot {
                row,
                column,
                item: (column < row_shape.filled).then_some(first + column),
            })
        })
    }

    /// Reshape `items` into one `Vec` per row, following the filled counts.
    pub fn arrange<T>(&self, items: Vec<T>) -> CoreResult<Vec<Vec<T>>> {
        let expected = self.filled_count();
        if items.len() != expected {
            return Err(CoreError::LengthMismatch {
                what: "grid items",
                expected,
                actual: items.len(),
            });
        }

        let mut items = items.into_iter();
        Ok(self
            .rows
            .iter()
            .map(|row| items.by_ref().take(row.filled).collect())
            .collect())
    }
}

impl fmt::Display for GridLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            for _ in 0..row.filled {
                f.write_str("# ")?;
            }
            for _ in 0..row.padding {
                f.write_str(". ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Plan the most nearly square rectangle holding `n` items.
pub fn plan(n: usize) -> CoreResult<GridLayout> {
    if n == 0 {
        return Err(CoreError::EmptyInput {
            what: "grid item count",
        });
    }

    let r = n.isqrt();
    let diff = n - r * r;

    let rows = if diff == 0 {
        vec![GridRow::new(r, 0); r]
    } else if diff <= r {
        // widen the first `diff` rows by one column
        (0..r)
            .map(|i| {
                if i < diff {
                    GridRow::new(r + 1, 0)
                } else {
                    GridRow::new(r, 1)
                }
            })
            .collect()
    } else {
        // r rows of width r+1 cannot hold n, so add a partial last row
        let remainder = diff - r;
        let mut rows = vec![GridRow::new(r + 1, 0); r];
        rows.push(GridRow::new(remainder, r + 1 - remainder));
        rows
    };

    Ok(GridLayout { rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rows(layout: &GridLayout) -> Vec<(usize, usize)> {
        layout.rows().iter().map(|r| (r.filled, r.padding)).collect()
    }

    #[test]
    fn zero_items_is_an_error() {
        let err = plan(0).unwrap_err();
        assert!(matches!(err, CoreError::EmptyInput { .. }));
    }

    #[test]
    fn single_item() {
        assert_eq!(rows(&plan(1).unwrap()), vec![(1, 0)]);
    }

    #[test]
    fn perfect_square() {
        let layout = plan(9).unwrap();
        assert_eq!(rows(&layout), vec![(3, 0); 3]);
        assert_eq!(layout.padding_count(), 0);
    }

    #[test]
    fn small_excess_widens_leading_rows() {
        // r = 3, diff = 1
        assert_eq!(rows(&plan(10).unwrap()), vec![(4, 0), (3, 1), (3, 1)]);
        // r = 3, diff = 3: every row widened, no padding
        assert_eq!(rows(&plan(12).unwrap()), vec![(4, 0); 3]);
    }

    #[test]
    fn large_excess_adds_partial_row() {
        // r = 3, diff = 4 > r
        assert_eq!(
            rows(&plan(13).unwrap()),
            vec![(4, 0), (4, 0), (4, 0), (1, 3)]
        );
        // r = 2, diff = 3 > r
        assert_eq!(rows(&plan(7).unwrap()), vec![(3, 0), (3, 0), (1, 2)]);
    }

    #[test]
    fn slots_number_items_in_row_major_order() {
        let layout = plan(5).unwrap();
        // r = 2, diff = 1: [(3,0), (2,1)]
        let slots: Vec<_> = layout.slots().collect();
        assert_eq!(slots.len(), 6);
        assert_eq!(slots[2], Slot { row: 0, column: 2, item: Some(2) });
        assert_eq!(slots[3], Slot { row: 1, column: 0, item: Some(3) });
        assert_eq!(slots[5], Slot { row: 1, column: 2, item: None });
    }

    #[test]
    fn arrange_reshapes_items() {
        let layout = plan(5).unwrap();
        let grid = layout.arrange(vec!['a', 'b', 'c', 'd', 'e']).unwrap();
        assert_eq!(grid, vec![vec!['a', 'b', 'c'], vec!['d', 'e']]);
        assert!(layout.arrange(vec![1, 2]).is_err());
    }

    #[test]
    fn display_renders_tiles_and_padding() {
        let text = plan(3).unwrap().to_string();
        assert_eq!(text, "# # \n# . \n");
    }

    proptest! {
        #[test]
        fn plan_invariants(n in 1usize..5000) {
            let layout = plan(n).unwrap();
            let rows = layout.row_count();
            let cols = layout.column_count();

            prop_assert_eq!(layout.filled_count(), n);
            prop_assert!(layout.rows().iter().all(|r| r.width() == cols));
            prop_assert!(cols == rows || cols == rows + 1);
            prop_assert!(rows * cols >= n);
            // one row fewer could not hold every item
            prop_assert!((rows - 1) * cols < n);
            prop_assert_eq!(layout.slots().filter(|s| s.item.is_some()).count(), n);
            let max_filled = layout.rows().iter().map(|r| r.filled).max().unwrap();
            prop_assert_eq!(max_filled, cols);
        }
    }
}
