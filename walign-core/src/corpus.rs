//! # Corpus Paralelo — Parse de Pares de Sentenças
//!
//! O formato de entrada é uma linha por par de sentenças:
//!
//! ```text
//! o gato preto ||| the black cat
//! ```
//!
//! Tokens são strings não-vazias separadas por espaço; `|||` é o separador
//! reservado entre o lado fonte e o lado alvo. O parse produz dois vetores de
//! IDs já internados no [`Vocab`](crate::vocab::Vocab).

use crate::vocab::Vocab;

/// Divide uma linha do corpus em (fonte, alvo).
///
/// A linha é tokenizada e o vetor de IDs é cortado na **primeira** ocorrência
/// de `separator_id`: o prefixo vira `src`, o sufixo vira `trg`. Sem separador,
/// tudo fica em `src` e `trg` sai vazio (o chamador trata como erro estrutural).
///
/// Ambos os vetores são reutilizados entre chamadas, sem alocação em regime
/// permanente.
pub fn parse_line(
    vocab: &mut Vocab,
    line: &str,
    separator_id: u32,
    src: &mut Vec<u32>,
    trg: &mut Vec<u32>,
) {
    vocab.tokenize_line(line, separator_id, src);
    trg.clear();
    if let Some(pos) = src.iter().position(|&id| id == separator_id) {
        trg.extend(src.drain(pos..).skip(1));
    }
}
