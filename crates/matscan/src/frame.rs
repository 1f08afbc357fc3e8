//! Frame and row data model.
//!
//! The mat is read column by column; each selected column produces one
//! [`Row`] of samples across the full sensor height — the 14 channels of
//! ADC "A" followed by the 14 channels of ADC "B". A full sweep of all
//! columns yields a [`MatFrame`].

/// Mat channels wired to each ADC.
pub const CHANNELS_PER_ADC: usize = 14;

/// Samples per row: both ADCs' channels concatenated.
pub const ROW_WIDTH: usize = 2 * CHANNELS_PER_ADC;

/// Rows per frame — one per shift-register column output.
pub const COL_HEIGHT: usize = 56;

/// Total samples in one frame.
pub const MAT_SIZE: usize = ROW_WIDTH * COL_HEIGHT;

/// Bytes clocked back per conversion request: the chip returns each 8-bit
/// sample split across two bytes (see [`crate::adc::deinterleave`]).
pub const ADC_RESPONSE_LENGTH: usize = 2 * CHANNELS_PER_ADC;

/// One row of samples, handed off by value between scan and transmit.
pub type Row = [u8; ROW_WIDTH];

/// A complete pressure image: COL_HEIGHT rows of ROW_WIDTH samples,
/// row-major. Written once during a scan, read-only afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct MatFrame {
    cells: [u8; MAT_SIZE],
}

impl MatFrame {
    /// A zeroed frame, usable as a `static` initialiser.
    pub const fn new() -> Self {
        Self {
            cells: [0u8; MAT_SIZE],
        }
    }

    /// Copy `row` into row slot `index`. Out-of-range indices are ignored;
    /// the scan engine only produces indices below [`COL_HEIGHT`].
    pub fn set_row(&mut self, index: usize, row: &Row) {
        let start = index.saturating_mul(ROW_WIDTH);
        if let Some(slot) = self
            .cells
            .get_mut(start..start.saturating_add(ROW_WIDTH))
        {
            slot.copy_from_slice(row);
        }
    }

    /// Borrow row `index`, or `None` past the end of the frame.
    pub fn row(&self, index: usize) -> Option<&Row> {
        let start = index.checked_mul(ROW_WIDTH)?;
        let slice = self.cells.get(start..start.checked_add(ROW_WIDTH)?)?;
        slice.try_into().ok()
    }

    /// The whole frame as the raw byte stream sent to the host.
    pub fn as_bytes(&self) -> &[u8; MAT_SIZE] {
        &self.cells
    }

    /// Iterate over the frame's rows in column order.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        (0..COL_HEIGHT).filter_map(|i| self.row(i))
    }
}

impl Default for MatFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for MatFrame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "MatFrame({COL_HEIGHT}x{ROW_WIDTH})")
    }
}

/// Human-readable hex dump, one row per line. Debug aid for bench bring-up;
/// the host link never uses this format.
impl core::fmt::Display for MatFrame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for row in self.rows() {
            for (i, sample) in row.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{sample:02x}")?;
            }
            f.write_str("\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn test_new_frame_is_zeroed() {
        let frame = MatFrame::new();
        assert!(frame.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_set_row_lands_row_major() {
        let mut frame = MatFrame::new();
        let mut row = [0u8; ROW_WIDTH];
        for (i, cell) in row.iter_mut().enumerate() {
            *cell = i as u8;
        }
        frame.set_row(2, &row);

        assert_eq!(frame.row(2), Some(&row));
        // Row-major layout: row 2 occupies bytes [56, 84).
        assert_eq!(&frame.as_bytes()[2 * ROW_WIDTH..3 * ROW_WIDTH], &row[..]);
        // Neighbours untouched.
        assert!(frame.row(1).is_some_and(|r| r.iter().all(|&b| b == 0)));
        assert!(frame.row(3).is_some_and(|r| r.iter().all(|&b| b == 0)));
    }

    #[test]
    fn test_out_of_range_row_is_ignored() {
        let mut frame = MatFrame::new();
        frame.set_row(COL_HEIGHT, &[0xFF; ROW_WIDTH]);
        assert!(frame.as_bytes().iter().all(|&b| b == 0));
        assert!(frame.row(COL_HEIGHT).is_none());
    }

    #[test]
    fn test_rows_iterates_all_columns() {
        let frame = MatFrame::new();
        assert_eq!(frame.rows().count(), COL_HEIGHT);
    }
}
