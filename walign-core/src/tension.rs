//! # Otimizador de Tensão — Casamento de Features por Gradiente
//!
//! Entre iterações de EM, a tensão diagonal λ é ajustada para que a feature
//! diagonal **do modelo** (esperança de `feature` sob o prior, somada pelo
//! histograma de tamanhos) case com a feature **empírica** acumulada no passo
//! E. Como `d log Z/dλ` é exatamente a esperança da feature, o casamento é uma
//! subida de gradiente em λ com passo fixo 20 e orçamento fixo de 8 passos —
//! sem busca de linha e sem teste de convergência.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::info;

use crate::diagonal;

/// Quantidade fixa de passos de gradiente por chamada.
const STEPS: usize = 8;

/// Tamanho do passo de gradiente.
const STEP_SIZE: f64 = 20.0;

/// Intervalo permitido para λ.
const LAMBDA_RANGE: (f64, f64) = (0.1, 14.0);

/// Executa os 8 passos de ajuste e retorna o novo λ.
///
/// `size_counts` é o histograma (m, n) → ocorrências do corpus, `toks` a soma
/// dos comprimentos-alvo e `emp_feat` a feature empírica **já normalizada**
/// por `toks`. Os buckets do histograma são independentes; cada passo avalia
/// suas contribuições em paralelo e as reduz em ordem fixa de bucket, então o
/// resultado não depende do número de threads.
pub fn optimize(
    size_counts: &HashMap<(usize, usize), u64>,
    toks: f64,
    emp_feat: f64,
    mut lambda: f64,
) -> f64 {
    let mut buckets: Vec<((usize, usize), u64)> =
        size_counts.iter().map(|(&shape, &count)| (shape, count)).collect();
    buckets.sort_unstable();

    for step in 0..STEPS {
        let contributions: Vec<f64> = buckets
            .par_iter()
            .map(|&((m, n), count)| {
                (1..=m)
                    .map(|j| count as f64 * diagonal::dlog_z(j, m, n, lambda))
                    .sum::<f64>()
            })
            .collect();
        let model_feat: f64 = contributions.iter().sum::<f64>() / toks;
        info!(
            "  {} feature diagonal do modelo: {} (tensão={})",
            step + 1,
            model_feat,
            lambda
        );
        lambda += (emp_feat - model_feat) * STEP_SIZE;
        lambda = lambda.clamp(LAMBDA_RANGE.0, LAMBDA_RANGE.1);
    }
    lambda
}
