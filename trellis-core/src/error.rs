use thiserror::Error;

/// All errors produced by trellis-core.
#[derive(Debug, Error)]
pub enum TrellisError {
    #[error(
        "folder '{path}' does not contain model files; \
         make sure the model path points at a v1 or v2 model directory"
    )]
    ModelLayout { path: std::path::PathBuf },

    #[error(
        "model '{path}' has no usable decoding graph: \
         expected HCLG.fst, or HCLr.fst + Gr.fst + disambig_tid.int"
    )]
    GraphMissing { path: std::path::PathBuf },

    #[error("model load error: {0}")]
    ModelLoad(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("best path is not linear — cannot extract word alignment")]
    NonLinearLattice,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TrellisError>;
