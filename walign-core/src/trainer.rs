//! # Treinador EM — Orquestrador do Alinhamento
//!
//! O [`Aligner`] percorre o corpus paralelo uma vez por iteração de EM:
//!
//! 1. **Passo E**: para cada posição-alvo, calcula o posterior sobre as
//!    posições-fonte (incluindo a posição nula 0, se habilitada) combinando a
//!    probabilidade lexical da [tabela](crate::ttable::TTable) com o prior de
//!    posição — uniforme (modelo 1) ou [diagonal](crate::diagonal).
//! 2. **Acúmulo**: os posteriors viram contagens esperadas no buffer de
//!    contagens, mais as estatísticas de verossimilhança e da feature
//!    diagonal empírica.
//! 3. **Passo M**: entre iterações, a tabela é normalizada (MLE ou VB) e,
//!    quando habilitado, a tensão diagonal é reajustada pelo
//!    [otimizador](crate::tension).
//!
//! Na iteração final o passo E vira decodificação: em vez de acumular
//! contagens, emite o link de Viterbi (argmax do posterior) de cada posição
//! alvo, uma linha por sentença, na ordem do corpus. A tabela **não** é
//! normalizada na última iteração — ela permanece com as probabilidades da
//! penúltima, prontas para exportação.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::mem;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::corpus;
use crate::diagonal;
use crate::error::{AlignError, Result};
use crate::tension;
use crate::ttable::TTable;
use crate::vocab::Vocab;

/// Token separador entre fonte e alvo no corpus.
pub const SEPARATOR_TOKEN: &str = "|||";

/// Token da palavra nula (posição-fonte virtual 0).
pub const NULL_TOKEN: &str = "<eps>";

/// Configuração de uma execução de treino.
///
/// Espelha as opções da linha de comando; nenhum estado global — a
/// configuração é passada explicitamente para o [`Aligner`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Troca fonte e alvo de cada linha antes de treinar.
    pub reverse: bool,
    /// Número de iterações de EM (a última é a decodificação de Viterbi).
    pub iterations: usize,
    /// Usa o prior diagonal em vez do uniforme.
    pub favor_diagonal: bool,
    /// Massa de prior da palavra nula (`p0`) no modo diagonal.
    pub prob_align_null: f64,
    /// Tensão diagonal inicial (λ).
    pub diagonal_tension: f64,
    /// Reotimiza λ entre iterações (exige `favor_diagonal`).
    pub optimize_tension: bool,
    /// Passo M variational-Bayes em vez de MLE.
    pub variational_bayes: bool,
    /// Parâmetro α do prior de Dirichlet (só usado com VB).
    pub alpha: f64,
    /// Permite alinhar tokens-alvo à palavra nula.
    pub use_null: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            reverse: false,
            iterations: 5,
            favor_diagonal: false,
            prob_align_null: 0.08,
            diagonal_tension: 4.0,
            optimize_tension: false,
            variational_bayes: false,
            alpha: 0.01,
            use_null: true,
        }
    }
}

impl TrainerConfig {
    /// Rejeita combinações inválidas antes de qualquer treino.
    pub fn validate(&self) -> Result<()> {
        if self.variational_bayes && self.alpha <= 0.0 {
            return Err(AlignError::InvalidAlpha(self.alpha));
        }
        if self.iterations == 0 {
            return Err(AlignError::NoIterations);
        }
        Ok(())
    }
}

/// Estatísticas observáveis de uma iteração de EM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationStats {
    /// Número da iteração (1-based).
    pub iteration: usize,
    /// Log-verossimilhança natural do corpus sob o modelo da iteração anterior.
    pub log_likelihood: f64,
    /// A mesma verossimilhança em base 2.
    pub base2_likelihood: f64,
    /// `-log₂ L / Σm` — bits por token-alvo.
    pub cross_entropy: f64,
    /// `2^(entropia cruzada)`.
    pub perplexity: f64,
    /// Fração da massa posterior atribuída à palavra nula.
    pub posterior_p0: f64,
    /// Feature diagonal empírica média por token (alvo do otimizador de tensão).
    pub posterior_feature: f64,
    /// Cardinalidade do histograma de tamanhos (m, n).
    pub size_count_buckets: usize,
    /// Tensão λ vigente ao fim da iteração.
    pub diagonal_tension: f64,
}

/// O alinhador: vocabulário, tabela de tradução e estado de EM de uma execução.
pub struct Aligner {
    config: TrainerConfig,
    vocab: Vocab,
    ttable: TTable,
    /// Tensão diagonal corrente (muda quando `optimize_tension` está ativo).
    lambda: f64,
    separator_id: u32,
    null_id: u32,
    /// Histograma (m, n) → ocorrências, construído na iteração 1.
    size_counts: HashMap<(usize, usize), u64>,
    /// Vetor de posteriors reaproveitado; `probs[0]` é a palavra nula.
    probs: Vec<f64>,
    /// Razão média alvo/fonte, conhecida após a iteração 1.
    mean_srclen_multiplier: f64,
}

impl Aligner {
    /// Cria o alinhador e interna os dois tokens especiais.
    pub fn new(config: TrainerConfig) -> Self {
        let mut vocab = Vocab::new();
        let separator_id = vocab.intern(SEPARATOR_TOKEN);
        let null_id = vocab.intern(NULL_TOKEN);
        Self {
            lambda: config.diagonal_tension,
            config,
            vocab,
            ttable: TTable::new(),
            separator_id,
            null_id,
            size_counts: HashMap::new(),
            probs: Vec::new(),
            mean_srclen_multiplier: 0.0,
        }
    }

    /// Executa o treino completo sobre `input`, escrevendo os links de
    /// Viterbi da iteração final em `out` (uma linha por sentença, na ordem
    /// do corpus).
    ///
    /// O arquivo é reaberto a cada iteração; qualquer iteração pode falhar
    /// com erro de I/O. O estado de treino é acumulativo: para treinar outro
    /// corpus, crie um novo `Aligner`.
    pub fn align<W: Write>(&mut self, input: &Path, out: &mut W) -> Result<Vec<IterationStats>> {
        self.config.validate()?;
        let iterations = self.config.iterations;
        let mut all_stats = Vec::with_capacity(iterations);
        for iter in 0..iterations {
            let final_iteration = iter + 1 == iterations;
            info!(
                "iteração {}/{}{}",
                iter + 1,
                iterations,
                if final_iteration { " (final)" } else { "" }
            );
            all_stats.push(self.run_iteration(iter, final_iteration, input, out)?);
        }
        Ok(all_stats)
    }

    /// Uma passada completa pelo corpus: passo E (ou Viterbi na final),
    /// relatório, otimização de tensão e passo M.
    fn run_iteration<W: Write>(
        &mut self,
        iter: usize,
        final_iteration: bool,
        input: &Path,
        out: &mut W,
    ) -> Result<IterationStats> {
        let file = File::open(input).map_err(|source| AlignError::Io {
            path: input.to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);

        let use_null = self.config.use_null;
        let favor_diagonal = self.config.favor_diagonal;
        let prob_align_null = self.config.prob_align_null;
        let prob_align_not_null = 1.0 - prob_align_null;

        let mut likelihood = 0.0;
        let mut denom = 0.0;
        let mut c0 = 0.0;
        let mut emp_feat = 0.0;
        let mut toks = 0.0;
        let mut tot_len_ratio = 0.0;
        let mut lc = 0usize;
        let mut src: Vec<u32> = Vec::new();
        let mut trg: Vec<u32> = Vec::new();

        for line in reader.lines() {
            let line = line.map_err(|source| AlignError::Io {
                path: input.to_path_buf(),
                source,
            })?;
            lc += 1;
            if lc % 50_000 == 0 {
                info!("{} pares processados", lc);
            }
            corpus::parse_line(&mut self.vocab, &line, self.separator_id, &mut src, &mut trg);
            if self.config.reverse {
                mem::swap(&mut src, &mut trg);
            }
            if src.is_empty() || trg.is_empty() {
                return Err(AlignError::EmptySide { line_no: lc, line });
            }
            let n = src.len();
            let m = trg.len();
            if iter == 0 {
                tot_len_ratio += m as f64 / n as f64;
                *self.size_counts.entry((m, n)).or_insert(0) += 1;
            }
            denom += m as f64;
            toks += m as f64;
            self.probs.resize(n + 1, 0.0);
            let mut first_link = true;

            for j in 0..m {
                let f_j = trg[j];
                let mut sum = 0.0;
                // prior uniforme (modelo 1); sobrescrito no modo diagonal
                let mut prob_a_i = 1.0 / (n + usize::from(use_null)) as f64;
                if use_null {
                    if favor_diagonal {
                        prob_a_i = prob_align_null;
                    }
                    self.probs[0] = self.ttable.prob(self.null_id, f_j) * prob_a_i;
                    sum += self.probs[0];
                }
                let az = if favor_diagonal {
                    // as posições reais dividem a massa restante (1 - p0);
                    // sem palavra nula elas ficam com toda a massa
                    let null_mass = if use_null { prob_align_not_null } else { 1.0 };
                    diagonal::z(j + 1, m, n, self.lambda) / null_mass
                } else {
                    0.0
                };
                for i in 1..=n {
                    if favor_diagonal {
                        prob_a_i = diagonal::unnormalized_prob(j + 1, i, m, n, self.lambda) / az;
                    }
                    self.probs[i] = self.ttable.prob(src[i - 1], f_j) * prob_a_i;
                    sum += self.probs[i];
                }

                if final_iteration {
                    // decodificação: argmax do posterior; link só para posições reais
                    let mut max_index = 0usize;
                    let mut max_p = if use_null { self.probs[0] } else { -1.0 };
                    for i in 1..=n {
                        if self.probs[i] > max_p {
                            max_p = self.probs[i];
                            max_index = i;
                        }
                    }
                    if max_index > 0 {
                        if first_link {
                            first_link = false;
                        } else {
                            write!(out, " ")?;
                        }
                        if self.config.reverse {
                            write!(out, "{}-{}", j, max_index - 1)?;
                        } else {
                            write!(out, "{}-{}", max_index - 1, j)?;
                        }
                    }
                } else {
                    if use_null {
                        let count = self.probs[0] / sum;
                        c0 += count;
                        self.ttable.increment(self.null_id, f_j, count);
                    }
                    for i in 1..=n {
                        let p = self.probs[i] / sum;
                        self.ttable.increment(src[i - 1], f_j, p);
                        // índice alvo 0-based aqui; o otimizador usa 1-based
                        emp_feat += diagonal::feature(j, i, m, n) * p;
                    }
                }
                likelihood += sum.ln();
            }
            if final_iteration {
                writeln!(out)?;
            }
        }

        let base2_likelihood = likelihood / std::f64::consts::LN_2;
        if iter == 0 && lc > 0 {
            self.mean_srclen_multiplier = tot_len_ratio / lc as f64;
            info!(
                "comprimento esperado do alvo = comprimento da fonte * {:.4}",
                self.mean_srclen_multiplier
            );
        }
        if toks > 0.0 {
            emp_feat /= toks;
        }
        let cross_entropy = -base2_likelihood / denom;
        let perplexity = 2f64.powf(-base2_likelihood / denom);
        let posterior_p0 = c0 / toks;

        info!("  log_e verossimilhança: {likelihood}");
        info!("  log_2 verossimilhança: {base2_likelihood}");
        info!("       entropia cruzada: {cross_entropy}");
        info!("           perplexidade: {perplexity}");
        info!("           p0 posterior: {posterior_p0}");
        info!("feature diagonal empírica: {emp_feat}");
        info!("     tamanhos distintos: {}", self.size_counts.len());

        if !final_iteration {
            if favor_diagonal && self.config.optimize_tension && iter > 0 {
                self.lambda = tension::optimize(&self.size_counts, toks, emp_feat, self.lambda);
                info!("tensão final: {}", self.lambda);
            }
            if self.config.variational_bayes {
                self.ttable.normalize_vb(self.config.alpha);
            } else {
                self.ttable.normalize();
            }
        }

        Ok(IterationStats {
            iteration: iter + 1,
            log_likelihood: likelihood,
            base2_likelihood,
            cross_entropy,
            perplexity,
            posterior_p0,
            posterior_feature: emp_feat,
            size_count_buckets: self.size_counts.len(),
            diagonal_tension: self.lambda,
        })
    }

    /// Exporta a tabela de probabilidades condicionais treinada.
    pub fn export_probabilities<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path: PathBuf = path.as_ref().to_path_buf();
        self.ttable
            .export(&path, &self.vocab)
            .map_err(|source| AlignError::Io { path, source })
    }

    /// Tabela de tradução corrente (probabilidades da última normalização).
    pub fn ttable(&self) -> &TTable {
        &self.ttable
    }

    /// Vocabulário da execução.
    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    /// Tensão diagonal corrente.
    pub fn diagonal_tension(&self) -> f64 {
        self.lambda
    }

    /// Razão média `|alvo| / |fonte|` observada na iteração 1.
    pub fn mean_srclen_multiplier(&self) -> f64 {
        self.mean_srclen_multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn corpus_file(name: &str, contents: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("walign-{}-{}.txt", std::process::id(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn no_null_config(iterations: usize) -> TrainerConfig {
        TrainerConfig {
            iterations,
            use_null: false,
            ..TrainerConfig::default()
        }
    }

    #[test]
    fn test_two_sentence_mle_expected_counts() {
        // passo E uniforme: contagens 0.5 na primeira sentença, 1.0 na segunda
        let path = corpus_file("s1", "a b ||| x y\na ||| x\n");
        let mut aligner = Aligner::new(no_null_config(2));
        let mut out = Vec::new();
        let stats = aligner.align(&path, &mut out).unwrap();
        std::fs::remove_file(&path).ok();

        let vocab = aligner.vocab();
        let (a, b) = (vocab.intern_frozen("a"), vocab.intern_frozen("b"));
        let (x, y) = (vocab.intern_frozen("x"), vocab.intern_frozen("y"));
        let table = aligner.ttable();
        assert!((table.prob(a, x) - 0.75).abs() < 1e-12);
        assert!((table.prob(a, y) - 0.25).abs() < 1e-12);
        assert!((table.prob(b, x) - 0.5).abs() < 1e-12);
        assert!((table.prob(b, y) - 0.5).abs() < 1e-12);

        // cada linha da tabela soma 1
        for s in [a, b] {
            let sum: f64 = table
                .iter_probs()
                .filter(|&(src, _, _)| src == s)
                .map(|(_, _, p)| p)
                .sum();
            assert!((sum - 1.0).abs() < 1e-12);
        }

        // Viterbi da iteração 2: "a" vence "x" na posição 0
        assert_eq!(String::from_utf8(out).unwrap(), "0-0 1-1\n0-0\n");

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].size_count_buckets, 2); // (2,2) e (1,1)
    }

    #[test]
    fn test_reverse_matches_swapped_corpus() {
        let fwd_path = corpus_file("s5-fwd", "b ||| a\n");
        let rev_path = corpus_file("s5-rev", "a ||| b\n");

        let mut fwd_out = Vec::new();
        Aligner::new(no_null_config(2))
            .align(&fwd_path, &mut fwd_out)
            .unwrap();

        let rev_config = TrainerConfig {
            reverse: true,
            ..no_null_config(2)
        };
        let mut rev_out = Vec::new();
        Aligner::new(rev_config).align(&rev_path, &mut rev_out).unwrap();

        std::fs::remove_file(&fwd_path).ok();
        std::fs::remove_file(&rev_path).ok();

        assert_eq!(fwd_out, rev_out);
        assert_eq!(String::from_utf8(fwd_out).unwrap(), "0-0\n");
    }

    #[test]
    fn test_likelihood_is_monotone_under_mle() {
        let path = corpus_file(
            "mono",
            "o gato ||| the cat\no cachorro ||| the dog\ngato preto ||| black cat\n",
        );
        let mut aligner = Aligner::new(TrainerConfig {
            iterations: 6,
            ..TrainerConfig::default()
        });
        let mut out = Vec::new();
        let stats = aligner.align(&path, &mut out).unwrap();
        std::fs::remove_file(&path).ok();

        for pair in stats.windows(2) {
            let (prev, next) = (pair[0].log_likelihood, pair[1].log_likelihood);
            assert!(
                next >= prev - 1e-6 * prev.abs(),
                "verossimilhança caiu: {prev} -> {next}"
            );
        }
    }

    #[test]
    fn test_empty_side_is_fatal_with_line_number() {
        let path = corpus_file("vazio", "a ||| b\n ||| c\n");
        let mut out = Vec::new();
        let err = Aligner::new(TrainerConfig::default())
            .align(&path, &mut out)
            .unwrap_err();
        std::fs::remove_file(&path).ok();
        match err {
            AlignError::EmptySide { line_no, .. } => assert_eq!(line_no, 2),
            other => panic!("erro inesperado: {other}"),
        }
    }

    #[test]
    fn test_null_tie_produces_empty_line() {
        // com tabela no piso, nulo e token real empatam; o argmax fica no nulo
        // e a sentença sai sem links (linha vazia)
        let path = corpus_file("nulo", "a ||| b\n");
        let mut aligner = Aligner::new(TrainerConfig {
            iterations: 1,
            ..TrainerConfig::default()
        });
        let mut out = Vec::new();
        aligner.align(&path, &mut out).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(String::from_utf8(out).unwrap(), "\n");
    }

    #[test]
    fn test_diagonal_prior_aligns_monotonically() {
        // sem contagens treinadas, o prior diagonal decide sozinho
        let path = corpus_file("diag", "p q r ||| u v w\n");
        let config = TrainerConfig {
            iterations: 1,
            favor_diagonal: true,
            use_null: false,
            ..TrainerConfig::default()
        };
        let mut out = Vec::new();
        Aligner::new(config).align(&path, &mut out).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(String::from_utf8(out).unwrap(), "0-0 1-1 2-2\n");
    }

    #[test]
    fn test_sentence_order_does_not_change_links() {
        // entrada sem empates: os links por sentença independem da ordem do
        // corpus (as contagens esperadas são somas sobre sentenças)
        let ab = corpus_file("ordem-ab", "a b ||| x y\na ||| x\nc ||| z\n");
        let ba = corpus_file("ordem-ba", "c ||| z\na ||| x\na b ||| x y\n");

        let mut out_ab = Vec::new();
        Aligner::new(no_null_config(3)).align(&ab, &mut out_ab).unwrap();
        let mut out_ba = Vec::new();
        Aligner::new(no_null_config(3)).align(&ba, &mut out_ba).unwrap();

        std::fs::remove_file(&ab).ok();
        std::fs::remove_file(&ba).ok();

        let lines_ab: Vec<String> = String::from_utf8(out_ab)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        let lines_ba: Vec<String> = String::from_utf8(out_ba)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(lines_ab, vec![lines_ba[2].clone(), lines_ba[1].clone(), lines_ba[0].clone()]);
    }

    #[test]
    fn test_export_and_reload_agree() {
        let corpus = corpus_file("export", "a b ||| x y\na ||| x\n");
        let mut aligner = Aligner::new(no_null_config(2));
        let mut out = Vec::new();
        aligner.align(&corpus, &mut out).unwrap();
        std::fs::remove_file(&corpus).ok();

        let table_path = corpus_file("export-tabela", "");
        aligner.export_probabilities(&table_path).unwrap();

        let mut vocab = aligner.vocab().clone();
        let mut reloaded = TTable::new();
        let file = std::fs::File::open(&table_path).unwrap();
        reloaded
            .load_probs(std::io::BufReader::new(file), &mut vocab)
            .unwrap();
        std::fs::remove_file(&table_path).ok();

        for (s, t, p) in aligner.ttable().iter_probs() {
            let q = reloaded.prob(s, t);
            assert!(((p - q) / p).abs() < 1e-9, "par ({s}, {t}): {p} vs {q}");
        }
    }

    #[test]
    fn test_validate_rejects_bad_alpha() {
        let config = TrainerConfig {
            variational_bayes: true,
            alpha: 0.0,
            ..TrainerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AlignError::InvalidAlpha(_))
        ));
        assert!(matches!(
            no_null_config(0).validate(),
            Err(AlignError::NoIterations)
        ));
    }

    #[test]
    fn test_missing_input_is_io_error() {
        let mut out = Vec::new();
        let err = Aligner::new(TrainerConfig::default())
            .align(Path::new("/caminho/que/nao/existe"), &mut out)
            .unwrap_err();
        assert!(matches!(err, AlignError::Io { .. }));
    }
}
