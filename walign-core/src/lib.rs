//! # walign-core — Alinhamento de Palavras em Corpora Bilíngues
//!
//! Esta crate treina, via Expectation-Maximization, um alinhamento lexical
//! entre pares de sentenças paralelas (modelo IBM 2 reparametrizado com prior
//! diagonal). O resultado é:
//! - uma **tabela de tradução** `p(alvo | fonte)` esparsa, e
//! - os **links de Viterbi** de cada par de sentenças, emitidos na iteração
//!   final.
//!
//! ## Fluxo do Treino
//!
//! ```text
//! Corpus paralelo → Parse (|||) → Passo E (posteriors) → Contagens esperadas
//!       ↑                                                       ↓
//!       └──── próxima iteração ←──  Passo M (normalização) ←────┘
//! ```
//!
//! Entre iterações, a tensão diagonal λ pode ser reotimizada para casar a
//! feature diagonal do modelo com a empírica ([`tension`]).
//!
//! ## Exemplo
//!
//! ```rust
//! use walign_core::TTable;
//!
//! let mut table = TTable::new();
//! table.increment(1, 2, 3.0);
//! table.increment(1, 3, 1.0);
//! table.normalize();
//! assert!((table.prob(1, 2) - 0.75).abs() < 1e-12);
//! ```

pub mod corpus;
pub mod diagonal;
pub mod error;
pub mod tension;
pub mod trainer;
pub mod ttable;
pub mod vocab;

pub use error::{AlignError, Result};
pub use trainer::{Aligner, IterationStats, TrainerConfig};
pub use ttable::TTable;
pub use vocab::Vocab;
