#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertStage {
    FrontMatter,
    Header,
    Data,
}

impl ConvertStage {
    pub fn label(&self) -> &'static str {
        match self {
            ConvertStage::FrontMatter => "front matter",
            ConvertStage::Header => "header",
            ConvertStage::Data => "data",
        }
    }
}

/// Emitted after every consumed row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvertProgress {
    /// 0-based index of the row just consumed.
    pub row: usize,
    /// Index of the last row, when known up front.
    pub total: Option<usize>,
    pub stage: ConvertStage,
    pub runs: usize,
}

impl ConvertProgress {
    /// True once the last row has been consumed.
    pub fn is_complete(&self) -> bool {
        self.total == Some(self.row)
    }

    pub fn fraction_complete(&self) -> Option<f64> {
        self.total.map(|total| {
            if total == 0 {
                1.0
            } else {
                (self.row as f64 / total as f64).min(1.0)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_is_row_equals_total() {
        let mut p = ConvertProgress {
            row: 3,
            total: Some(4),
            stage: ConvertStage::Data,
            runs: 1,
        };
        assert!(!p.is_complete());
        assert_eq!(p.fraction_complete(), Some(0.75));
        p.row = 4;
        assert!(p.is_complete());
        p.total = None;
        assert!(!p.is_complete());
        assert_eq!(p.fraction_complete(), None);
    }
}
