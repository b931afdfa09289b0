//! Binário de linha de comando do alinhador: flags → configuração → treino,
//! com links de Viterbi em stdout e progresso em stderr.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use clap::error::ErrorKind;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use walign_core::{Aligner, TrainerConfig};

/// Treinador de alinhamento de palavras para corpora paralelos.
///
/// A entrada é um par de sentenças por linha, `fonte ||| alvo`. Os links de
/// Viterbi da iteração final saem em stdout, um `i-j` (0-based) por par
/// alinhado.
#[derive(Parser, Debug)]
#[command(name = "walign", version, about)]
struct Args {
    /// Corpus paralelo de entrada
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Troca fonte e alvo de cada linha (condiciona no alvo, prediz a fonte)
    #[arg(short = 'r', long = "reverse")]
    reverse: bool,

    /// Número de iterações de EM
    #[arg(short = 'I', long = "iterations", default_value_t = 5)]
    iterations: usize,

    /// Favorece pontos de alinhamento próximos da diagonal monotônica
    #[arg(short = 'd', long = "favor_diagonal")]
    favor_diagonal: bool,

    /// Massa de prior da palavra nula (p0)
    #[arg(short = 'p', long = "p0", default_value_t = 0.08)]
    p0: f64,

    /// λ inicial do prior diagonal
    #[arg(short = 'T', long = "diagonal_tension", default_value_t = 4.0)]
    diagonal_tension: f64,

    /// Reotimiza λ entre as iterações
    #[arg(short = 'o', long = "optimize_tension")]
    optimize_tension: bool,

    /// Prior de Dirichlet nas distribuições lexicais (variational Bayes)
    #[arg(short = 'v', long = "variational_bayes")]
    variational_bayes: bool,

    /// Parâmetro α do prior de Dirichlet
    #[arg(short = 'a', long = "alpha", default_value_t = 0.01)]
    alpha: f64,

    /// Desabilita a palavra nula
    #[arg(short = 'N', long = "no_null_word")]
    no_null_word: bool,

    /// Exporta a tabela de probabilidades condicionais para este arquivo
    #[arg(short = 'c', long = "conditional_probabilities")]
    conditional_probabilities: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    // saída 1 em erro de uso (flag desconhecida, --input ausente);
    // --help e --version continuam saindo com 0
    let args = Args::try_parse().unwrap_or_else(|err| {
        let code = match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
            _ => 1,
        };
        let _ = err.print();
        process::exit(code);
    });

    if let Err(err) = run(args) {
        error!("{err}");
        process::exit(1);
    }
}

fn run(args: Args) -> walign_core::Result<()> {
    let config = TrainerConfig {
        reverse: args.reverse,
        iterations: args.iterations,
        favor_diagonal: args.favor_diagonal,
        prob_align_null: args.p0,
        diagonal_tension: args.diagonal_tension,
        optimize_tension: args.optimize_tension,
        variational_bayes: args.variational_bayes,
        alpha: args.alpha,
        use_null: !args.no_null_word,
    };
    config.validate()?;

    let mut aligner = Aligner::new(config);
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    aligner.align(&args.input, &mut out)?;
    out.flush()?;

    if let Some(path) = args.conditional_probabilities {
        info!("probabilidades condicionais: {}", path.display());
        aligner.export_probabilities(&path)?;
    }
    Ok(())
}
