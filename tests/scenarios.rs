//! Integration tests mirroring the concrete worked scenarios: identity +
//! row broadcast, elementwise multiply/divide, batched matmul, transpose,
//! axis reduction, and a Sequential parameter count.

use tendril::{Array, DType, Linear, Module, ReLU, ScalarValue, Sequential};

fn row_vector(values: &[f32]) -> Array {
    let mut a = Array::array_init(vec![values.len()], DType::F32).unwrap();
    for (i, &v) in values.iter().enumerate() {
        a.set_value(&[i], ScalarValue::F32(v)).unwrap();
    }
    a
}

fn leaf(a: Array) -> tendril::Tensor {
    tendril::Tensor::tensor_init(a, true, None).unwrap()
}

fn constant(a: Array) -> tendril::Tensor {
    tendril::Tensor::tensor_init(a, false, None).unwrap()
}

fn v(t: &tendril::Tensor, idx: &[usize]) -> f32 {
    match t.data().value_at(idx).unwrap() {
        ScalarValue::F32(x) => x,
        _ => panic!("expected f32"),
    }
}

#[test]
fn identity_plus_row_broadcast() {
    let a = leaf(Array::eye(3, 3, DType::F32).unwrap());
    let b = leaf(row_vector(&[2.0, 3.0, 4.0]));
    let c = tendril::add(&a, &b).unwrap();

    let expect = [[3.0, 3.0, 4.0], [2.0, 4.0, 4.0], [2.0, 3.0, 5.0]];
    for i in 0..3 {
        for j in 0..3 {
            assert_eq!(v(&c, &[i, j]), expect[i][j]);
        }
    }

    let ones = constant(Array::ones(vec![3, 3], DType::F32).unwrap());
    tendril::backward(&c, Some(ones), false).unwrap();

    let a_grad = a.grad().unwrap();
    let b_grad = b.grad().unwrap();
    for i in 0..3 {
        for j in 0..3 {
            assert_eq!(v(&a_grad, &[i, j]), 1.0);
        }
    }
    for j in 0..3 {
        assert_eq!(v(&b_grad, &[j]), 3.0);
    }
}

#[test]
fn multiply_with_broadcast() {
    let a = leaf(Array::eye(3, 3, DType::F32).unwrap());
    let b = leaf(row_vector(&[2.0, 3.0, 4.0]));
    let c = tendril::mul(&a, &b).unwrap();

    let expect = [[2.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 4.0]];
    for i in 0..3 {
        for j in 0..3 {
            assert_eq!(v(&c, &[i, j]), expect[i][j]);
        }
    }

    let ones = constant(Array::ones(vec![3, 3], DType::F32).unwrap());
    tendril::backward(&c, Some(ones), false).unwrap();

    let a_grad = a.grad().unwrap();
    let b_grad = b.grad().unwrap();
    let expect_a = [[2.0, 3.0, 4.0], [2.0, 3.0, 4.0], [2.0, 3.0, 4.0]];
    for i in 0..3 {
        for j in 0..3 {
            assert_eq!(v(&a_grad, &[i, j]), expect_a[i][j]);
        }
    }
    for j in 0..3 {
        assert_eq!(v(&b_grad, &[j]), 1.0);
    }
}

#[test]
fn divide_via_inverse() {
    let a = leaf(Array::eye(3, 3, DType::F32).unwrap());
    let b = leaf(row_vector(&[2.0, 3.0, 4.0]));
    let c = tendril::div(&a, &b).unwrap();

    let expect = [1.0 / 2.0, 1.0 / 3.0, 1.0 / 4.0];
    for i in 0..3 {
        for j in 0..3 {
            let want = if i == j { expect[i] } else { 0.0 };
            assert!((v(&c, &[i, j]) - want).abs() < 1e-6);
        }
    }

    let ones = constant(Array::ones(vec![3, 3], DType::F32).unwrap());
    tendril::backward(&c, Some(ones), false).unwrap();

    let a_grad = a.grad().unwrap();
    let b_grad = b.grad().unwrap();
    let expect_a = [0.5, 1.0 / 3.0, 0.25];
    for i in 0..3 {
        for j in 0..3 {
            assert!((v(&a_grad, &[i, j]) - expect_a[j]).abs() < 1e-5);
        }
    }
    let expect_b = [-0.25, -1.0 / 9.0, -1.0 / 16.0];
    for j in 0..3 {
        assert!((v(&b_grad, &[j]) - expect_b[j]).abs() < 1e-5);
    }
}

#[test]
fn batched_matmul_broadcasts_over_leading_batch() {
    let mut a = Array::array_init(vec![2, 3, 3], DType::F32).unwrap();
    let mut b = Array::array_init(vec![1, 3, 3], DType::F32).unwrap();
    let mut c = 1.0f32;
    for batch in 0..2 {
        for i in 0..3 {
            for j in 0..3 {
                a.set_value(&[batch, i, j], ScalarValue::F32(c)).unwrap();
                c += 1.0;
            }
        }
    }
    c = 1.0;
    for i in 0..3 {
        for j in 0..3 {
            b.set_value(&[0, i, j], ScalarValue::F32(c)).unwrap();
            c += 1.0;
        }
    }
    let product = a.matmul(&b).unwrap();
    assert_eq!(product.shape().dims(), &[2, 3, 3]);

    let mut a0 = Array::array_init(vec![3, 3], DType::F32).unwrap();
    let mut a1 = Array::array_init(vec![3, 3], DType::F32).unwrap();
    let mut b0 = Array::array_init(vec![3, 3], DType::F32).unwrap();
    for i in 0..3 {
        for j in 0..3 {
            a0.set_value(&[i, j], a.value_at(&[0, i, j]).unwrap()).unwrap();
            a1.set_value(&[i, j], a.value_at(&[1, i, j]).unwrap()).unwrap();
            b0.set_value(&[i, j], b.value_at(&[0, i, j]).unwrap()).unwrap();
        }
    }
    let expect0 = a0.matmul(&b0).unwrap();
    let expect1 = a1.matmul(&b0).unwrap();
    for i in 0..3 {
        for j in 0..3 {
            assert!((product.value_at(&[0, i, j]).unwrap().as_f64() - expect0.value_at(&[i, j]).unwrap().as_f64()).abs() < 1e-3);
            assert!((product.value_at(&[1, i, j]).unwrap().as_f64() - expect1.value_at(&[i, j]).unwrap().as_f64()).abs() < 1e-3);
        }
    }
}

#[test]
fn transpose_permutes_axes() {
    let mut a = Array::array_init(vec![2, 3, 3], DType::F32).unwrap();
    let mut val = 0.0f32;
    for i in 0..2 {
        for j in 0..3 {
            for k in 0..3 {
                a.set_value(&[i, j, k], ScalarValue::F32(val)).unwrap();
                val += 1.0;
            }
        }
    }
    let t = a.transpose(&[1, 2, 0]).unwrap();
    assert_eq!(t.shape().dims(), &[3, 3, 2]);
    for i in 0..2 {
        for j in 0..3 {
            for k in 0..3 {
                assert_eq!(t.value_at(&[j, k, i]).unwrap(), a.value_at(&[i, j, k]).unwrap());
            }
        }
    }
}

#[test]
fn sum_dim_reduces_one_axis() {
    let mut a = Array::array_init(vec![2, 3, 3], DType::F32).unwrap();
    for b in 0..2 {
        for i in 0..3 {
            for j in 0..3 {
                a.set_value(&[b, i, j], ScalarValue::F32((b * 9 + i * 3 + j) as f32)).unwrap();
            }
        }
    }
    let r = a.sum_dim(1, true).unwrap();
    assert_eq!(r.shape().dims(), &[2, 1, 3]);
    for b in 0..2 {
        for j in 0..3 {
            let expect: f32 = (0..3).map(|i| a.value_at(&[b, i, j]).unwrap().as_f64() as f32).sum();
            assert_eq!(v(&r, &[b, 0, j]), expect);
        }
    }
}

#[test]
fn sequential_parameter_count() {
    let model = Sequential::new(vec![
        Box::new(Linear::new(4, 8, true, DType::F32).unwrap()),
        Box::new(ReLU::new()),
        Box::new(Linear::new(8, 2, true, DType::F32).unwrap()),
    ]);
    assert_eq!(model.num_trainable_variables(), 4 * 8 + 8 + 8 * 2 + 2);
    assert_eq!(model.parameters().len(), 4);
}
