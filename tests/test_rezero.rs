use rand::prelude::*;
use rand_distr::StandardNormal;

use rezero::nn::{Lambda, Linear, Module, ReZero, ReZeroConfig, StateDict, DEFAULT_INIT_ALPHA};
use rezero::optim::Sgd;
use rezero::tensor::{functional, RcTensor, TensorError};

fn random_tensor(rng: &mut StdRng, shape: Vec<usize>) -> RcTensor<f64> {
    let count = shape.iter().product::<usize>();
    let array = (0..count).map(|_| rng.sample(StandardNormal)).collect();
    RcTensor::new(array, shape)
}

fn random_block(rng: &mut StdRng, width: usize) -> ReZero<f64, Linear<f64>> {
    let inner = Linear::init(width, width, Some(functional::tanh), rng).unwrap();
    ReZero::new(width, inner)
}

fn assert_close(left: &RcTensor<f64>, right: &RcTensor<f64>, tolerance: f64) {
    assert_eq!(left.shape(), right.shape());
    for (l, r) in left.iter().zip(right.iter()) {
        assert!((l - r).abs() <= tolerance, "left={left}, right={right}");
    }
}

#[test]
fn test_forward_is_input_plus_gated_inner_output() {
    let mut rng = StdRng::seed_from_u64(0);
    for width in [1, 3, 8] {
        let block = random_block(&mut rng, width);
        let x = random_tensor(&mut rng, vec![5, width]);

        let inner = block.module().forward(x.clone());
        let expected = &x + &(block.alpha() * &inner);
        assert_eq!(block.forward(x), expected);
    }
}

#[test]
fn test_alpha_is_exactly_1e_3_at_construction() {
    let mut rng = StdRng::seed_from_u64(1);
    let block = random_block(&mut rng, 4);
    assert_eq!(block.alpha().elem(), 1e-3);
    assert_eq!(block.alpha().elem(), DEFAULT_INIT_ALPHA);

    let block = ReZeroConfig::new(4)
        .init(Lambda::new(|x: RcTensor<f64>| x))
        .unwrap();
    assert_eq!(block.alpha().elem(), 1e-3);
}

#[test]
fn test_identity_inner_scales_by_one_plus_alpha() {
    let mut rng = StdRng::seed_from_u64(2);
    let block = ReZero::new(6, Lambda::new(|x: RcTensor<f64>| x));
    let x = random_tensor(&mut rng, vec![2, 3, 6]);
    let expected = &x * (1.0 + block.alpha().elem());
    assert_close(&block.forward(x), &expected, 1e-12);
}

#[test]
fn test_zero_alpha_is_identity() {
    let mut rng = StdRng::seed_from_u64(3);
    let inner = Linear::<f64>::init(4, 4, Some(functional::relu), &mut rng).unwrap();
    let block = ReZeroConfig::new(4).with_init_alpha(0.0).init(inner).unwrap();
    let x = random_tensor(&mut rng, vec![7, 4]);
    assert_eq!(block.forward(x.clone()), x);
}

#[test]
fn test_alpha_gradient_equals_summed_inner_output() {
    let mut rng = StdRng::seed_from_u64(4);
    let block = random_block(&mut rng, 3);
    let x = random_tensor(&mut rng, vec![4, 3]);

    block.forward(x.clone()).sum().backward();
    let inner_sum = block.module().forward(x).sum().elem();
    assert!((block.alpha().grad().elem() - inner_sum).abs() < 1e-12);
}

#[test]
fn test_inner_params_receive_scaled_gradients() {
    let block = ReZero::new(
        2,
        Linear::new(RcTensor::ones(vec![2, 2]), RcTensor::zeros(vec![1, 2]), None),
    );
    block.forward(RcTensor::from([[1.0, 2.0]])).sum().backward();
    // d/dW sum(x + alpha * x @ W) = alpha * x^T @ 1
    assert_close(
        &block.module().weights.grad(),
        &RcTensor::from([[1e-3, 1e-3], [2e-3, 2e-3]]),
        1e-15,
    );
}

#[test]
fn test_doubling_scenario() {
    let block = ReZero::new(4, Lambda::new(|x: RcTensor<f64>| &x * 2.0));
    let out = block.forward(RcTensor::from([1.0, 2.0, 3.0, 4.0]));
    assert_close(&out, &RcTensor::from([1.002, 2.004, 3.006, 4.008]), 1e-12);
}

#[test]
fn test_mismatched_inner_output_fails_in_addition() {
    let block = ReZero::new(4, Lambda::new(|x: RcTensor<f64>| x.sum()));
    // a scalar inner output broadcasts
    assert_eq!(block.forward(RcTensor::zeros(vec![4])), RcTensor::zeros(vec![4]));

    let block = ReZero::new(4, Lambda::new(|_: RcTensor<f64>| RcTensor::zeros(vec![2, 3])));
    assert!(matches!(
        block.try_forward(RcTensor::zeros(vec![4])),
        Err(TensorError::ShapeMismatch { op: "add", .. })
    ));
}

#[test]
fn test_deep_stack_starts_near_identity() {
    let mut rng = StdRng::seed_from_u64(5);
    let stack: Vec<_> = (0..32).map(|_| random_block(&mut rng, 4)).collect();
    let x = random_tensor(&mut rng, vec![3, 4]);
    // each block moves x by at most alpha * |tanh| <= 1e-3 per element
    assert_close(&stack.forward(x.clone()), &x, 32.0 * 1e-3);

    let names: Vec<_> = stack.named_params().into_iter().map(|(n, _)| n).collect();
    assert_eq!(names.len(), 32 * 3);
    assert_eq!(&names[..3], ["0.alpha", "0.module.weights", "0.module.bias"]);
}

#[test]
fn test_training_moves_alpha_and_reduces_loss() {
    let mut rng = StdRng::seed_from_u64(6);
    let mut stack: Vec<_> = (0..4).map(|_| random_block(&mut rng, 2)).collect();
    let input = RcTensor::from([[1.0, 2.0]]);
    let target = RcTensor::from([[-1.0, 1.0]]);
    let loss_of = |stack: &Vec<ReZero<f64, Linear<f64>>>| {
        (&stack.forward(input.clone()) - &target).abs().sum()
    };

    let optimizer = Sgd::new(1e-2).unwrap();
    let initial_loss = loss_of(&stack).elem();
    for _ in 0..50 {
        loss_of(&stack).backward();
        optimizer.step(&mut stack).unwrap();
    }
    assert!(loss_of(&stack).elem() < initial_loss);
    assert!(stack.iter().any(|block| block.alpha().elem() != 1e-3));
}

#[test]
fn test_state_dict_round_trip_through_stack() {
    let mut rng = StdRng::seed_from_u64(7);
    let source: Vec<_> = (0..3).map(|_| random_block(&mut rng, 2)).collect();
    let json = StateDict::from_module(&source).unwrap().to_json().unwrap();

    let mut target: Vec<_> = (0..3).map(|_| random_block(&mut rng, 2)).collect();
    assert_ne!(target.params(), source.params());
    StateDict::from_json(&json)
        .unwrap()
        .load_into(&mut target)
        .unwrap();
    assert_eq!(target.params(), source.params());
}
