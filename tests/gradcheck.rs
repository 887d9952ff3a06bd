//! Finite-difference gradient checking and higher-order (`create_graph`)
//! differentiation.

use tendril::{Array, DType, ScalarValue, Tensor};

fn leaf_from(values: &[f32], shape: Vec<usize>) -> Tensor {
    let mut a = Array::array_init(shape.clone(), DType::F32).unwrap();
    for (lin, &val) in values.iter().enumerate() {
        let mut idx = vec![0usize; shape.len()];
        let mut rem = lin;
        for d in (0..shape.len()).rev() {
            idx[d] = rem % shape[d];
            rem /= shape[d];
        }
        a.set_value(&idx, ScalarValue::F32(val)).unwrap();
    }
    Tensor::tensor_init(a, true, None).unwrap()
}

fn scalar_loss(t: &Tensor) -> Tensor {
    tendril::sum(t).unwrap()
}

/// Numerically estimate d(loss)/d(x_i) by central differences, for a
/// scalar-valued function built from `x` via `f`.
fn numeric_grad(x_values: &[f32], shape: Vec<usize>, f: impl Fn(&Tensor) -> Tensor) -> Vec<f32> {
    let eps = 1e-3f32;
    let mut grads = Vec::with_capacity(x_values.len());
    for i in 0..x_values.len() {
        let mut plus = x_values.to_vec();
        plus[i] += eps;
        let mut minus = x_values.to_vec();
        minus[i] -= eps;
        let lp = f(&leaf_from(&plus, shape.clone())).item().unwrap().as_f64();
        let lm = f(&leaf_from(&minus, shape.clone())).item().unwrap().as_f64();
        grads.push(((lp - lm) / (2.0 * eps as f64)) as f32);
    }
    grads
}

#[test]
fn mul_matches_finite_difference() {
    let shape = vec![2, 2];
    let x_vals = [1.0f32, 2.0, -1.5, 0.5];
    let x = leaf_from(&x_vals, shape.clone());
    let y = tendril::mul(&x, &x).unwrap();
    let loss = scalar_loss(&y);
    tendril::backward(&loss, None, false).unwrap();
    let analytic = x.grad().unwrap();

    let numeric = numeric_grad(&x_vals, shape, |t| scalar_loss(&tendril::mul(t, t).unwrap()));
    for (lin, &expect) in numeric.iter().enumerate() {
        let idx = [lin / 2, lin % 2];
        let got = match analytic.data().value_at(&idx).unwrap() {
            ScalarValue::F32(v) => v,
            _ => panic!(),
        };
        assert!((got - expect).abs() < 1e-2, "got {} expect {}", got, expect);
    }
}

#[test]
fn matmul_matches_finite_difference() {
    let shape = vec![2, 2];
    let x_vals = [1.0f32, 2.0, 3.0, 4.0];
    let w = leaf_from(&[0.5, -1.0, 2.0, 0.25], shape.clone());
    let x = leaf_from(&x_vals, shape.clone());
    let y = tendril::matmul(&x, &w).unwrap();
    let loss = scalar_loss(&y);
    tendril::backward(&loss, None, false).unwrap();
    let analytic = x.grad().unwrap();

    let numeric = numeric_grad(&x_vals, shape.clone(), |t| {
        let w2 = leaf_from(&[0.5, -1.0, 2.0, 0.25], vec![2, 2]);
        scalar_loss(&tendril::matmul(t, &w2).unwrap())
    });
    for (lin, &expect) in numeric.iter().enumerate() {
        let idx = [lin / 2, lin % 2];
        let got = match analytic.data().value_at(&idx).unwrap() {
            ScalarValue::F32(v) => v,
            _ => panic!(),
        };
        assert!((got - expect).abs() < 1e-2, "got {} expect {}", got, expect);
    }
}

#[test]
fn create_graph_allows_second_derivative() {
    // y = x^3 via x * x * x; dy/dx = 3x^2; d2y/dx2 = 6x.
    let x = leaf_from(&[2.0], vec![]);
    let x2 = tendril::mul(&x, &x).unwrap();
    let y = tendril::mul(&x2, &x).unwrap();

    tendril::backward(&y, None, true).unwrap();
    let dx = x.grad().unwrap();
    assert!((dx.item().unwrap().as_f64() - 12.0).abs() < 1e-4);
    assert!(dx.requires_grad(), "first-order grad must itself require grad under create_graph");

    dx.zero_grad().unwrap();
    x.zero_grad().unwrap();
    tendril::backward(&dx, None, true).unwrap();
    // d(3x^2)/dx = 6x = 12 at x=2, accumulated back into x via the grad graph.
    let d2x = x.grad().unwrap();
    assert!((d2x.item().unwrap().as_f64() - 12.0).abs() < 1e-3);
}
