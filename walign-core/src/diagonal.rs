//! # Prior Diagonal — Custo de Posição e Normalizadores em Forma Fechada
//!
//! No modelo IBM 2 reparametrizado, a probabilidade (não normalizada) de a
//! posição-alvo `i` alinhar com a posição-fonte `j` depende só da distância ao
//! ponto correspondente da diagonal da sentença:
//!
//! ```text
//! feature(i, j, m, n) = -|j/n - i/m|
//! unnorm(i, j)        = exp(lambda * feature(i, j, m, n))
//! ```
//!
//! onde `m` é o comprimento do alvo, `n` o da fonte e `lambda` a tensão
//! diagonal (quanto maior, mais massa perto da diagonal).
//!
//! ## Por que forma fechada?
//!
//! O normalizador `Z(i) = Σ_j unnorm(i, j)` e sua derivada `d log Z / dλ`
//! aparecem dentro do laço de EM e do otimizador de tensão — somá-los termo a
//! termo custaria `O(n)` por posição. Mas a sequência de features é linear por
//! partes em `j`, quebrando na diagonal `j* = floor(i·n/m)`: acima e abaixo
//! dela os termos formam séries geométricas de razão `r = exp(-λ/n)`. `Z` sai
//! de duas séries geométricas e `d log Z / dλ` de duas séries
//! aritmético-geométricas, ambas em `O(1)`.
//!
//! Convenções: índices 1-based, `1 <= i <= m`, `1 <= j <= n`, `n >= 1`,
//! `lambda > 0`. Nenhuma função aloca ou falha.

/// Distância (negada) do par `(i, j)` à diagonal da sentença.
///
/// Sempre `<= 0`, com igualdade exatamente quando `j/n == i/m`.
#[inline]
pub fn feature(i: usize, j: usize, m: usize, n: usize) -> f64 {
    -(j as f64 / n as f64 - i as f64 / m as f64).abs()
}

/// `exp(lambda * feature)` — o peso não normalizado da posição `j`.
#[inline]
pub fn unnormalized_prob(i: usize, j: usize, m: usize, n: usize, lambda: f64) -> f64 {
    (feature(i, j, m, n) * lambda).exp()
}

/// Normalizador `Z(i) = Σ_{j=1..n} unnorm(i, j)` em forma fechada.
///
/// As duas séries geométricas são ancoradas nos vizinhos imediatos da
/// diagonal: a de cima em `j* + 1` (comprimento `n - j*`), a de baixo em `j*`
/// (comprimento `j*`). Quando `j* = 0` ou `j* = n` só um ramo contribui.
pub fn z(i: usize, m: usize, n: usize, lambda: f64) -> f64 {
    let split = i as f64 * n as f64 / m as f64;
    let floor = split as usize;
    let ceil = floor + 1;
    let ratio = (-lambda / n as f64).exp();
    let num_top = n - floor;
    let mut ezt = 0.0;
    let mut ezb = 0.0;
    if num_top > 0 {
        ezt = unnormalized_prob(i, ceil, m, n, lambda) * (1.0 - ratio.powi(num_top as i32))
            / (1.0 - ratio);
    }
    if floor > 0 {
        ezb = unnormalized_prob(i, floor, m, n, lambda) * (1.0 - ratio.powi(floor as i32))
            / (1.0 - ratio);
    }
    ezb + ezt
}

/// Derivada `d log Z / d lambda` em forma fechada.
///
/// `d log Z/dλ = (1/Z) Σ_j feature(i,j) · unnorm(i,j)`: o numerador é uma soma
/// de produtos de uma progressão aritmética (as features, passo `-1/n` ao se
/// afastar da diagonal) por uma geométrica (os pesos, razão `r`), resolvida
/// por [`arithmetico_geometric_series`] em cada ramo.
pub fn dlog_z(i: usize, m: usize, n: usize, lambda: f64) -> f64 {
    let z = z(i, m, n, lambda);
    let split = i as f64 * n as f64 / m as f64;
    let floor = split as usize;
    let ceil = floor + 1;
    let ratio = (-lambda / n as f64).exp();
    let d = -1.0 / n as f64;
    let num_top = n - floor;
    let mut pct = 0.0;
    let mut pcb = 0.0;
    if num_top > 0 {
        pct = arithmetico_geometric_series(
            feature(i, ceil, m, n),
            unnormalized_prob(i, ceil, m, n, lambda),
            ratio,
            d,
            num_top,
        );
    }
    if floor > 0 {
        pcb = arithmetico_geometric_series(
            feature(i, floor, m, n),
            unnormalized_prob(i, floor, m, n, lambda),
            ratio,
            d,
            floor,
        );
    }
    (pct + pcb) / z
}

/// Soma fechada de `Σ_{k=1..len} a_k · g_k` com `a_k` aritmética (primeiro
/// termo `a_1`, passo `d`) e `g_k` geométrica (primeiro termo `g_1`, razão `r`).
///
/// ```text
/// S = (a_len·g_{len+1} - a_1·g_1) / (r - 1) - d·(g_{len+1} - g_2) / (r - 1)²
/// ```
#[inline]
fn arithmetico_geometric_series(a_1: f64, g_1: f64, r: f64, d: f64, len: usize) -> f64 {
    let g_np1 = g_1 * r.powi(len as i32);
    let a_n = d * (len - 1) as f64 + a_1;
    let x_1 = a_1 * g_1;
    let g_2 = g_1 * r;
    let rm1 = r - 1.0;
    (a_n * g_np1 - x_1) / rm1 - d * (g_np1 - g_2) / (rm1 * rm1)
}
