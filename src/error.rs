use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AutodiffError {
    /// The operand cannot take part in an operation on this tape.
    #[error("invalid operand: {0}")]
    InvalidOperand(String),
}

impl AutodiffError {
    pub(crate) fn foreign_term(idx: u32) -> Self {
        Self::InvalidOperand(format!("term a{idx} belongs to a different tape"))
    }

    pub(crate) fn out_of_range(idx: u32, len: usize) -> Self {
        Self::InvalidOperand(format!(
            "node a{idx} does not exist on a tape of {len} nodes"
        ))
    }
}

pub type Result<T> = std::result::Result<T, AutodiffError>;

#[test]
fn test_error_message() {
    let e = AutodiffError::out_of_range(7, 3);
    assert_eq!(
        e.to_string(),
        "invalid operand: node a7 does not exist on a tape of 3 nodes"
    );
}
