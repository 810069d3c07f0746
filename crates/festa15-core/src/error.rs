//! Error types for the festa15 engine.
//!
//! Every fallible operation returns [`FestaResult`]. Variants are grouped by
//! origin: invite validation, authentication, backend I/O, and local misuse.
//! [`FestaError::user_message`] maps each variant to a short guest-facing
//! string so presentation layers never match on the enum themselves.

use thiserror::Error;

/// Result type alias for engine operations.
pub type FestaResult<T> = Result<T, FestaError>;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum FestaError {
    // Invite validation
    #[error("invite code not found: {0}")]
    InvalidCode(String),

    #[error("invite code already used: {0}")]
    AlreadyUsed(String),

    // Authentication
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    #[error("anonymous sign-in is disabled on this backend")]
    AnonymousDisabled,

    #[error("not signed in")]
    NotSignedIn,

    #[error("operation requires the admin segment")]
    NotAuthorized,

    // Backend I/O
    #[error("backend error: {0}")]
    Backend(String),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no row found in {table}")]
    RowNotFound { table: &'static str },

    #[error("expected one row in {table}, found {count}")]
    MultipleRows { table: &'static str, count: usize },

    #[error("conflict: {0}")]
    Conflict(String),

    // Local misuse
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FestaError {
    /// Short guest-facing message for notice banners.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidCode(_) => "Código inválido. Confira e tente novamente.",
            Self::AlreadyUsed(_) => "Este convite já foi utilizado.",
            Self::AuthRejected(_) => "Não foi possível entrar. Verifique suas credenciais.",
            Self::AnonymousDisabled => "Informe seu e-mail para receber o link de acesso.",
            Self::NotSignedIn => "Entre com seu convite para continuar.",
            Self::NotAuthorized => "Apenas o administrador pode fazer isso.",
            Self::Backend(_) | Self::Http(_) => "Falha de conexão com o servidor. Tente novamente.",
            Self::RowNotFound { .. } => "Registro não encontrado.",
            Self::MultipleRows { .. } => "Dados inconsistentes no servidor.",
            Self::Conflict(_) => "Conflito ao salvar. Tente novamente.",
            Self::InvalidOperation(_) => "Operação inválida.",
            Self::Serialization(_) => "Resposta inesperada do servidor.",
            Self::Io(_) => "Falha ao acessar arquivos locais.",
        }
    }

    /// True for the variants raised while checking an invite code.
    pub fn is_invite_rejection(&self) -> bool {
        matches!(self, Self::InvalidCode(_) | Self::AlreadyUsed(_))
    }
}
