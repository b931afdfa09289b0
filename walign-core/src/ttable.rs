//! # Tabela de Tradução — Contagens e Probabilidades Lexicais
//!
//! Guarda a distribuição condicional `p(alvo | fonte)` de forma esparsa:
//! um vetor externo denso indexado pelo ID fonte e, por linha, um mapa
//! esparso ID alvo → valor.
//!
//! ## Double-buffer
//!
//! Durante o passo E a tabela de **probabilidades** é só-leitura enquanto as
//! contagens esperadas se acumulam num buffer paralelo de **contagens**. No
//! passo M os dois buffers trocam de papel atomicamente (`swap`) e as novas
//! contagens são normalizadas no lugar. Células ausentes leem como o piso
//! [`PROB_FLOOR`], o que garante massa positiva para qualquer par.
//!
//! A normalização tem dois modos:
//! - **MLE** ([`TTable::normalize`]): cada linha dividida pelo seu total.
//! - **Variational Bayes** ([`TTable::normalize_vb`]): forma fechada do
//!   posterior de Dirichlet, `v → exp(Ψ(v + α) − Ψ(Σ(v + α)))`, com `α`
//!   contado uma vez por célula existente na linha.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::mem;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::vocab::Vocab;

/// Valor lido para pares (fonte, alvo) sem célula explícita.
pub const PROB_FLOOR: f64 = 1e-9;

/// Linha esparsa: ID alvo → valor.
type Row = HashMap<u32, f64>;

/// Tabela de tradução esparsa com double-buffer de contagens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TTable {
    /// Probabilidades ativas, lidas pelo passo E.
    probs: Vec<Row>,
    /// Acumulador de contagens esperadas, escrito pelo passo E.
    counts: Vec<Row>,
}

impl TTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `p(t | s)`: valor armazenado, ou [`PROB_FLOOR`] se linha/célula não existem.
    #[inline]
    pub fn prob(&self, s: u32, t: u32) -> f64 {
        self.probs
            .get(s as usize)
            .and_then(|row| row.get(&t))
            .copied()
            .unwrap_or(PROB_FLOOR)
    }

    /// Soma `x` à contagem esperada do par `(s, t)`, criando linha e célula
    /// sob demanda. `x` deve ser finito e `>= 0`.
    #[inline]
    pub fn increment(&mut self, s: u32, t: u32, x: f64) {
        let s = s as usize;
        if s >= self.counts.len() {
            self.counts.resize_with(s + 1, Row::new);
        }
        *self.counts[s].entry(t).or_insert(0.0) += x;
    }

    /// Conta uma ocorrência inteira do par `(s, t)` — [`TTable::increment`]
    /// com `x = 1`.
    #[inline]
    pub fn increment_one(&mut self, s: u32, t: u32) {
        self.increment(s, t, 1.0);
    }

    /// Passo M (MLE): contagens viram as novas probabilidades.
    ///
    /// Cada linha é dividida pelo seu total; linha com total zero usa divisor 1
    /// (os zeros ficam no lugar). O buffer de contagens sai vazio.
    pub fn normalize(&mut self) {
        mem::swap(&mut self.probs, &mut self.counts);
        self.counts.clear();
        for row in &mut self.probs {
            let total: f64 = row.values().sum();
            let divisor = if total == 0.0 { 1.0 } else { total };
            for value in row.values_mut() {
                *value /= divisor;
            }
        }
    }

    /// Passo M variational-Bayes com prior de Dirichlet `alpha > 0`.
    ///
    /// O denominador usa `Σ(v + α)` sobre as células **presentes** na linha —
    /// α não é somado para símbolos nunca vistos, então a linha resultante
    /// soma menos que 1.
    pub fn normalize_vb(&mut self, alpha: f64) {
        mem::swap(&mut self.probs, &mut self.counts);
        self.counts.clear();
        for row in &mut self.probs {
            let mut total: f64 = row.values().map(|v| v + alpha).sum();
            if total == 0.0 {
                total = 1.0;
            }
            let denom = digamma(total);
            for value in row.values_mut() {
                *value = (digamma(*value + alpha) - denom).exp();
            }
        }
    }

    /// Soma as contagens de `rhs` às desta tabela; probabilidades intactas.
    ///
    /// É o gancho para acumulação particionada: cada shard treina num
    /// sub-corpus e os acumuladores são somados antes do passo M.
    pub fn plus_assign(&mut self, rhs: &TTable) {
        for (s, row) in rhs.counts.iter().enumerate() {
            for (&t, &value) in row {
                self.increment(s as u32, t, value);
            }
        }
    }

    /// Itera sobre as células explícitas de probabilidade como `(s, t, p)`.
    pub fn iter_probs(&self) -> impl Iterator<Item = (u32, u32, f64)> + '_ {
        self.probs
            .iter()
            .enumerate()
            .flat_map(|(s, row)| row.iter().map(move |(&t, &p)| (s as u32, t, p)))
    }

    /// Escreve uma linha `fonte \t alvo \t ln(p)` por célula explícita.
    ///
    /// A ordem de enumeração não é especificada; o leitor é [`TTable::load_probs`].
    pub fn write_probs<W: Write>(&self, out: &mut W, vocab: &Vocab) -> io::Result<()> {
        for (s, row) in self.probs.iter().enumerate() {
            if row.is_empty() {
                continue;
            }
            let src = vocab.lookup(s as u32);
            for (&t, &p) in row {
                writeln!(out, "{}\t{}\t{}", src, vocab.lookup(t), p.ln())?;
            }
        }
        Ok(())
    }

    /// Exporta a tabela de probabilidades para `path` no formato de
    /// [`TTable::write_probs`].
    pub fn export<P: AsRef<Path>>(&self, path: P, vocab: &Vocab) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.write_probs(&mut out, vocab)?;
        out.flush()
    }

    /// Inverso de [`TTable::write_probs`]: lê triplas `fonte alvo ln(p)` até o
    /// fim, internando os tokens e desfazendo o logaritmo.
    ///
    /// Tolerante a espaço extra e a uma última linha vazia. Retorna o número
    /// de parâmetros carregados.
    pub fn load_probs<R: BufRead>(&mut self, reader: R, vocab: &mut Vocab) -> io::Result<usize> {
        let mut loaded = 0;
        for line in reader.lines() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let (Some(e), Some(f), Some(lp)) = (fields.next(), fields.next(), fields.next())
            else {
                break;
            };
            let log_prob: f64 = lp
                .parse()
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
            let s = vocab.intern(e) as usize;
            if s >= self.probs.len() {
                self.probs.resize_with(s + 1, Row::new);
            }
            self.probs[s].insert(vocab.intern(f), log_prob.exp());
            loaded += 1;
        }
        Ok(loaded)
    }
}

/// Função digamma `Ψ(x)` para `x > 0`.
///
/// Desloca o argumento até `x >= 7` acumulando `-1/x` e fecha com a série
/// assintótica clássica (precisão absoluta melhor que 1e-10).
pub fn digamma(mut x: f64) -> f64 {
    let mut result = 0.0;
    while x < 7.0 {
        result -= 1.0 / x;
        x += 1.0;
    }
    x -= 0.5;
    let xx = 1.0 / x;
    let xx2 = xx * xx;
    let xx4 = xx2 * xx2;
    result += x.ln() + (1.0 / 24.0) * xx2 - (7.0 / 960.0) * xx4 + (31.0 / 8064.0) * xx4 * xx2
        - (127.0 / 30720.0) * xx4 * xx4;
    result
}
