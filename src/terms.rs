//! Pinned terms of service accepted on registration.
//!
//! Consent records store the version label and the SHA-256 of the exact text
//! so the accepted wording can be proven later. Changing the text requires a
//! new version label.

use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

pub const TERMS_VERSION: &str = "2024-06-01";

pub const TERMS_TEXT: &str = "\
Termo de consentimento para tratamento de dados pessoais (LGPD, Lei 13.709/2018).

Ao enviar este formulário, autorizo o escritório a tratar meu nome, CPF, e-mail e \
telefone com a finalidade exclusiva de verificar a existência de processos em que \
eu possa figurar como interessado e de entrar em contato para prestar informações \
sobre esses processos.

Os dados serão armazenados pelo tempo necessário ao atendimento dessa finalidade e \
não serão compartilhados com terceiros, salvo obrigação legal. Posso revogar este \
consentimento e solicitar a exclusão dos meus dados a qualquer momento pelos canais \
de atendimento do escritório.";

static TERMS_HASH: Lazy<String> = Lazy::new(|| format!("{:x}", Sha256::digest(TERMS_TEXT)));

/// Hex-encoded SHA-256 of [`TERMS_TEXT`].
#[must_use]
pub fn terms_hash() -> &'static str {
    TERMS_HASH.as_str()
}
