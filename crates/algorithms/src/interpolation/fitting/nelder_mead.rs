//! Box-constrained Nelder–Mead simplex minimizer
//!
//! Trial points are clamped into the box before evaluation. The objective may
//! return `+∞` for infeasible points; those vertices are simply the worst and
//! get replaced by contraction or shrinkage.

/// Termination settings
#[derive(Debug, Clone, Copy)]
pub(crate) struct SimplexOptions {
    pub max_iterations: usize,
    /// Relative spread of objective values across the simplex
    pub f_tolerance: f64,
    /// Simplex extent per coordinate, relative to the initial step
    pub x_tolerance: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct SimplexOutcome {
    pub x: Vec<f64>,
    pub fx: f64,
    pub iterations: usize,
    pub converged: bool,
}

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

fn clamp_into(x: &mut [f64], lower: &[f64], upper: &[f64]) {
    for ((v, lo), hi) in x.iter_mut().zip(lower).zip(upper) {
        *v = v.clamp(*lo, *hi);
    }
}

/// x_c + t (x_w − x_c), clamped
fn along(centroid: &[f64], worst: &[f64], t: f64, lower: &[f64], upper: &[f64]) -> Vec<f64> {
    let mut p: Vec<f64> = centroid.iter().zip(worst).map(|(c, w)| c + t * (w - c)).collect();
    clamp_into(&mut p, lower, upper);
    p
}

/// Minimize `f` starting from `x0`.
///
/// The initial simplex steps by `steps[j]` along each axis, stepping the
/// other way when the forward vertex would leave the box.
pub(crate) fn minimize<F>(
    mut f: F,
    x0: &[f64],
    steps: &[f64],
    lower: &[f64],
    upper: &[f64],
    options: SimplexOptions,
) -> SimplexOutcome
where
    F: FnMut(&[f64]) -> f64,
{
    let n = x0.len();
    let mut start = x0.to_vec();
    clamp_into(&mut start, lower, upper);

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(start.clone());
    for j in 0..n {
        let mut v = start.clone();
        v[j] = if v[j] + steps[j] <= upper[j] { v[j] + steps[j] } else { v[j] - steps[j] };
        clamp_into(&mut v, lower, upper);
        simplex.push(v);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| f(v)).collect();

    let mut iterations = 0;
    let mut converged = false;
    while iterations < options.max_iterations {
        // Order best → worst; NaN sorts as worst
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let best = values[0];
        let worst = values[n];
        let f_spread = worst - best;
        let x_spread_ok = (0..n).all(|j| {
            let extent = simplex.iter().map(|v| (v[j] - simplex[0][j]).abs()).fold(0.0_f64, f64::max);
            extent <= options.x_tolerance * steps[j]
        });
        if best.is_finite()
            && f_spread.is_finite()
            && (f_spread <= options.f_tolerance * (best.abs() + options.f_tolerance) || x_spread_ok)
        {
            converged = true;
            break;
        }

        iterations += 1;

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
            .collect();

        let reflected = along(&centroid, &simplex[n], -REFLECT, lower, upper);
        let f_reflected = f(&reflected);

        if f_reflected < best {
            let expanded = along(&centroid, &simplex[n], -EXPAND, lower, upper);
            let f_expanded = f(&expanded);
            if f_expanded < f_reflected {
                simplex[n] = expanded;
                values[n] = f_expanded;
            } else {
                simplex[n] = reflected;
                values[n] = f_reflected;
            }
            continue;
        }

        if f_reflected < values[n - 1] {
            simplex[n] = reflected;
            values[n] = f_reflected;
            continue;
        }

        let (contracted, f_contracted) = if f_reflected < worst {
            let p = along(&centroid, &simplex[n], -CONTRACT, lower, upper);
            let fp = f(&p);
            (p, fp)
        } else {
            let p = along(&centroid, &simplex[n], CONTRACT, lower, upper);
            let fp = f(&p);
            (p, fp)
        };

        if f_contracted < worst.min(f_reflected) {
            simplex[n] = contracted;
            values[n] = f_contracted;
            continue;
        }

        // Shrink towards the best vertex
        for i in 1..=n {
            let shrunk: Vec<f64> = simplex[0]
                .iter()
                .zip(&simplex[i])
                .map(|(b, v)| b + SHRINK * (v - b))
                .collect();
            values[i] = f(&shrunk);
            simplex[i] = shrunk;
        }
    }

    let (best_idx, _) = values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .unwrap_or((0, &f64::INFINITY));

    SimplexOutcome {
        x: simplex[best_idx].clone(),
        fx: values[best_idx],
        iterations,
        converged,
    }
}
