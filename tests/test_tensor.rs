use rezero::tensor::*;

#[test]
fn test_from_vec() {
    let tensor1 = RcTensor::from(vec![vec![0, 1, 2], vec![3, 4, 5]]);
    let tensor2 = RcTensor::new((0..6).collect(), vec![2, 3]);
    assert_eq!(tensor1, tensor2);
}

#[test]
fn test_new_with_filler() {
    let vec = RcTensor::new_with_filler(vec![4], 4);
    assert_eq!(vec.shape(), &vec![4]);
    assert_eq!(vec.get(&[0]).unwrap(), &4);
}

#[test]
fn test_try_new_checks_length() {
    assert!(matches!(
        RcTensor::try_new(vec![1, 2, 3], vec![2, 2]),
        Err(TensorError::LengthMismatch {
            expected: 4,
            actual: 3,
            ..
        })
    ));
}

#[test]
fn test_get_2x2x2() {
    let matrix = RcTensor::new(vec![0, 1, 2, 3, 4, 5, 6, 7], vec![2, 2, 2]);
    assert_eq!(*matrix.get(&[0, 0, 0]).unwrap(), 0);
    assert_eq!(*matrix.get(&[0, 1, 0]).unwrap(), 2);
    assert_eq!(*matrix.get(&[1, 1, 1]).unwrap(), 7);
    assert!(matches!(
        matrix.get(&[2, 0, 0]),
        Err(TensorError::IndexOutOfBounds { .. })
    ));
}

#[test]
fn test_get_3x3_is_row_major() {
    let matrix = RcTensor::new((0..9).collect(), vec![3, 3]);
    let flat: Vec<i32> = IndexIterator::new(vec![3, 3])
        .map(|index| *matrix.get(&index).unwrap())
        .collect();
    assert_eq!(flat, matrix.to_vec());
}

#[test]
fn test_add_scalar() {
    let tensor1 = RcTensor::new((0..32).collect(), vec![2, 4, 4]);
    let tensor2 = RcTensor::new((42..(32 + 42)).collect(), vec![2, 4, 4]);
    let scalar = RcTensor::scalar(42);
    assert_eq!(&tensor1 + &scalar, tensor2);
    assert_eq!(&scalar + &tensor1, tensor2);
}

#[test]
fn test_add_broadcasts_leading_dims() {
    let tensor1 = RcTensor::new_with_filler(vec![4, 4], 1);
    let tensor2 = RcTensor::new((0..32).collect(), vec![2, 4, 4]);
    let tensor3 = RcTensor::new((1..33).collect(), vec![2, 4, 4]);
    assert_eq!(&tensor2 + &tensor1, tensor3);
    assert_eq!(&tensor1 + &tensor2, tensor3);
}

#[test]
fn test_incompatible_shapes_are_errors() {
    let left = RcTensor::new_with_filler(vec![4], 1.0);
    let right = RcTensor::new_with_filler(vec![3], 1.0);
    let err = functional::try_add(&left, &right).unwrap_err();
    assert_eq!(
        err.to_string(),
        "shapes [4] and [3] are not compatible for add"
    );
    assert!(functional::try_mul(&left, &right).is_err());
}

#[test]
#[should_panic(expected = "not compatible")]
fn test_operator_panics_on_shape_mismatch() {
    let _ = &RcTensor::new_with_filler(vec![2], 1) + &RcTensor::new_with_filler(vec![3], 1);
}

#[test]
fn test_matmul_2x2() {
    let matrix = RcTensor::new(vec![0, 1, 2, 3], vec![2, 2]);
    let e1 = RcTensor::new(vec![0, 1], vec![2, 1]);
    let diag = RcTensor::new(vec![1, 1], vec![2, 1]);

    assert_eq!(matrix.matmul(&diag), RcTensor::new(vec![1, 5], vec![2, 1]));
    assert_eq!(matrix.matmul(&e1), RcTensor::new(vec![1, 3], vec![2, 1]));
}

#[test]
fn test_scalar_multiplication() {
    let vec = RcTensor::new_with_filler(vec![4], 1);
    assert_eq!(&vec * 42, RcTensor::new(vec![42, 42, 42, 42], vec![4]));
}

#[test]
fn test_backward_through_mixed_ops() {
    // f(x, y) = sum(relu(x * y - y))
    let x = RcTensor::from([2.0, 0.5, -1.0]);
    let y = RcTensor::from([3.0, 4.0, 1.0]);
    let out = (&(&x * &y) - &y).relu().sum();
    assert_eq!(out.elem(), 3.0);
    out.backward();
    assert_eq!(x.grad(), RcTensor::from([3.0, 0.0, 0.0]));
    assert_eq!(y.grad(), RcTensor::from([1.0, 0.0, 0.0]));
}

#[test]
fn test_detach_drops_history() {
    let x = RcTensor::from([1.0, 2.0]);
    let y = &x * &x;
    assert!(!y.is_leaf());
    let z = y.detach();
    assert!(z.is_leaf());
    assert_eq!(z, y);
    z.sum().backward();
    assert!(x.grad_opt().is_none());
}

#[test]
fn test_display() {
    let matrix = RcTensor::new(vec![1, 2, 3, 4], vec![2, 2]);
    assert_eq!(matrix.to_string(), "RcTensor(1, 2, 3, 4; shape=[2, 2])");
}
