use tendril::{Arena, DType, Linear, Module, Tensor};

#[test]
fn locked_arena_rejects_further_pushes() {
    let arena = Arena::new();
    let t = Tensor::zeros(vec![2], DType::F32, false, Some(&arena)).unwrap();
    assert_eq!(arena.len(), 1);
    arena.set_lock();
    let result = Tensor::zeros(vec![2], DType::F32, false, Some(&arena));
    assert!(result.is_err());
    drop(t);
}

#[test]
fn linear_forward_shape() {
    let layer = Linear::new(4, 8, true, DType::F32).unwrap();
    let x = Tensor::zeros(vec![3, 4], DType::F32, false, None).unwrap();
    let y = layer.forward(&x).unwrap();
    assert_eq!(y.shape().dims(), &[3, 8]);
}

#[test]
fn linear_parameter_arena_is_locked_after_init() {
    let layer = Linear::new(2, 2, true, DType::F32).unwrap();
    assert!(layer.environ().is_locked());
}
