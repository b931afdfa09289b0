//! # Vocabulário — Interning de Tokens
//!
//! Mapeia strings de tokens para IDs inteiros densos e vice-versa. Todo o
//! restante do sistema trabalha apenas com IDs: comparações viram comparações
//! de inteiros e a tabela de tradução pode indexar por posição.
//!
//! ## Convenções de ID
//!
//! - O ID `0` é reservado para "desconhecido" (consultas congeladas que não
//!   encontram o token). Nenhum token real recebe esse ID.
//! - IDs reais começam em `1` e são estáveis pela vida do vocabulário.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use walign_core::vocab::Vocab;
//!
//! let mut vocab = Vocab::new();
//! let id = vocab.intern("casa");
//! assert_eq!(vocab.intern("casa"), id);      // estável
//! assert_eq!(vocab.lookup(id), "casa");
//! assert_eq!(vocab.intern_frozen("barco"), 0); // desconhecido
//! ```

use std::collections::HashMap;

/// String devolvida por [`Vocab::lookup`] para o ID reservado `0`.
pub const UNKNOWN_TOKEN: &str = "<unk>";

/// Vocabulário bidirecional token ↔ ID.
#[derive(Debug, Clone, Default)]
pub struct Vocab {
    /// Tokens na ordem de interning; o token de ID `i` fica em `words[i-1]`.
    words: Vec<String>,
    /// Índice inverso string → ID.
    ids: HashMap<String, u32>,
}

impl Vocab {
    pub fn new() -> Self {
        Self {
            words: Vec::with_capacity(1000),
            ids: HashMap::new(),
        }
    }

    /// Retorna o ID de `word`, criando um novo se o token é inédito.
    pub fn intern(&mut self, word: &str) -> u32 {
        if let Some(&id) = self.ids.get(word) {
            return id;
        }
        self.words.push(word.to_string());
        let id = self.words.len() as u32;
        self.ids.insert(word.to_string(), id);
        id
    }

    /// Consulta sem alocar: tokens desconhecidos retornam o ID reservado `0`.
    pub fn intern_frozen(&self, word: &str) -> u32 {
        self.ids.get(word).copied().unwrap_or(0)
    }

    /// String do token de `id`. O ID `0` mapeia para [`UNKNOWN_TOKEN`].
    pub fn lookup(&self, id: u32) -> &str {
        if id == 0 {
            UNKNOWN_TOKEN
        } else {
            &self.words[id as usize - 1]
        }
    }

    /// Quantidade de tokens reais internados (não conta o ID reservado).
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Tokeniza uma linha delimitada por espaços e tabs, internando cada campo.
    ///
    /// Além dos campos, cada tab literal emite `separator_id` na posição em que
    /// aparece. É assim que o formato de corpus `fonte ||| alvo` convive com
    /// corpora tabulados: o chamador escolhe qual ID faz papel de separador.
    ///
    /// `out` é limpo e reutilizado (o laço de treino chama isto milhões de
    /// vezes; nenhuma alocação nova acontece em linhas já vistas).
    pub fn tokenize_line(&mut self, line: &str, separator_id: u32, out: &mut Vec<u32>) {
        out.clear();
        let bytes = line.as_bytes();
        let mut start: Option<usize> = None;
        for (pos, &byte) in bytes.iter().enumerate() {
            if byte == b' ' || byte == b'\t' {
                if let Some(begin) = start.take() {
                    out.push(self.intern(&line[begin..pos]));
                }
                if byte == b'\t' {
                    out.push(separator_id);
                }
            } else if start.is_none() {
                start = Some(pos);
            }
        }
        if let Some(begin) = start {
            out.push(self.intern(&line[begin..]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_stable() {
        let mut vocab = Vocab::new();
        let a = vocab.intern("gato");
        let b = vocab.intern("cachorro");
        assert_ne!(a, b);
        assert_eq!(vocab.intern("gato"), a);
        assert_eq!(vocab.lookup(a), "gato");
        assert_eq!(vocab.lookup(b), "cachorro");
        assert_eq!(vocab.len(), 2);
    }

    #[test]
    fn test_id_zero_is_reserved() {
        let mut vocab = Vocab::new();
        let first = vocab.intern("primeiro");
        assert_eq!(first, 1); // IDs reais começam em 1
        assert_eq!(vocab.lookup(0), UNKNOWN_TOKEN);
        assert_eq!(vocab.intern_frozen("inexistente"), 0);
        assert_eq!(vocab.intern_frozen("primeiro"), first);
    }

    #[test]
    fn test_tokenize_line_splits_on_whitespace() {
        let mut vocab = Vocab::new();
        let sep = vocab.intern("|||");
        let mut out = Vec::new();
        vocab.tokenize_line("o  gato ||| the cat", sep, &mut out);
        let words: Vec<&str> = out.iter().map(|&id| vocab.lookup(id)).collect();
        assert_eq!(words, vec!["o", "gato", "|||", "the", "cat"]);
    }

    #[test]
    fn test_tokenize_line_tab_emits_separator() {
        let mut vocab = Vocab::new();
        let sep = vocab.intern("|||");
        let mut out = Vec::new();
        vocab.tokenize_line("um gato\tone cat", sep, &mut out);
        let words: Vec<&str> = out.iter().map(|&id| vocab.lookup(id)).collect();
        // o tab separa o campo E emite o separador
        assert_eq!(words, vec!["um", "gato", "|||", "one", "cat"]);
    }

    #[test]
    fn test_tokenize_line_reuses_buffer() {
        let mut vocab = Vocab::new();
        let sep = vocab.intern("|||");
        let mut out = vec![99, 99, 99];
        vocab.tokenize_line("a", sep, &mut out);
        assert_eq!(out.len(), 1);
        vocab.tokenize_line("", sep, &mut out);
        assert!(out.is_empty());
    }
}
