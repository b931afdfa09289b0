//! Erros tipados da crate.
//!
//! Todo caminho de falha tem uma variante própria. O treinador é um processo
//! batch sem recuperação: quem chama decide encerrar (a CLI sai com código 1).

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AlignError>;

#[derive(Error, Debug)]
pub enum AlignError {
    /// O prior de Dirichlet exige `alpha > 0`.
    #[error("--alpha deve ser > 0 quando o modo variational Bayes está ativo (recebido {0})")]
    InvalidAlpha(f64),

    /// Pelo menos uma iteração de EM é necessária.
    #[error("o número de iterações de EM deve ser >= 1")]
    NoIterations,

    /// Falha ao abrir ou ler o corpus de entrada.
    #[error("não foi possível ler {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Sentença com lado fonte ou lado alvo vazio após o parse.
    #[error("erro na linha {line_no} (lado fonte ou alvo vazio):\n{line}")]
    EmptySide { line_no: usize, line: String },

    /// Falha ao escrever os links de alinhamento na saída.
    #[error("falha ao escrever a saída de alinhamentos: {0}")]
    Output(#[from] std::io::Error),
}
