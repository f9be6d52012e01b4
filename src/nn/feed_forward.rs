use crate::nn::module::{check_param_count, prefixed};
use crate::nn::{Linear, Module};
use crate::tensor::{NamedTensorList, Numeric, RcTensor, Result, TensorList};

/// Linear layers applied in order.
#[derive(Debug)]
pub struct Mlp<T, const N: usize>
where
    T: Numeric,
{
    layers: [Linear<T>; N],
}

impl<T: Numeric, const N: usize> Mlp<T, N> {
    pub fn new(layers: [Linear<T>; N]) -> Mlp<T, N> {
        Mlp { layers }
    }

    pub fn layers(&self) -> &[Linear<T>; N] {
        &self.layers
    }
}

impl<T: Numeric, const N: usize> Module<T> for Mlp<T, N> {
    fn try_forward(&self, batch: RcTensor<T>) -> Result<RcTensor<T>> {
        self.layers
            .iter()
            .try_fold(batch, |prev, layer| layer.try_forward(prev))
    }

    fn named_params(&self) -> NamedTensorList<T> {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(i, layer)| prefixed(&format!("layers.{i}"), layer.named_params()))
            .collect()
    }

    fn update_params(&mut self, new_params: TensorList<T>) -> Result<()> {
        check_param_count(2 * N, &new_params)?;
        let mut param_iter = new_params.into_iter();
        for layer in self.layers.iter_mut() {
            layer.update_params(param_iter.by_ref().take(2).collect())?;
        }
        Ok(())
    }
}

#[cfg(test)]
fn two_layer_mlp() -> Mlp<f64, 2> {
    use crate::tensor::functional;

    Mlp::new([
        Linear::new(
            RcTensor::from([[1.0, 1e-2, -1e-3, -2.0], [-1.1, 0., 0., 0.7]]),
            RcTensor::new_with_filler(vec![1, 4], 1.0),
            Some(functional::tanh),
        ),
        Linear::new(
            RcTensor::from([[1.0, -2.0], [-1.1, 0.7], [0.1, -0.2], [0.1, 0.0]]),
            RcTensor::new_with_filler(vec![1, 2], 1.0),
            Some(functional::tanh),
        ),
    ])
}

#[test]
fn test_mlp_param_names() {
    let mlp = two_layer_mlp();
    let names: Vec<_> = mlp.named_params().into_iter().map(|(name, _)| name).collect();
    assert_eq!(
        names,
        vec![
            "layers.0.weights",
            "layers.0.bias",
            "layers.1.weights",
            "layers.1.bias"
        ]
    );
}

#[test]
fn test_mlp_update_params_round_trips_order() {
    let mut mlp = two_layer_mlp();
    let doubled: TensorList<f64> = mlp.params().iter().map(|p| p * 2.0).collect();
    mlp.update_params(doubled.clone()).unwrap();
    assert_eq!(mlp.params(), doubled);
    assert!(mlp.update_params(doubled[..3].to_vec()).is_err());
}

#[test]
fn test_mlp() {
    use crate::optim::sgd::sgd_step;

    let mut mlp = two_layer_mlp();
    let input = RcTensor::new(vec![1.0, 2.0], vec![1, 2]);
    let expected = RcTensor::new(vec![-1.0, 1.0], vec![1, 2]);
    let loss_of = |mlp: &Mlp<f64, 2>| (&mlp.forward(input.clone()) - &expected).abs().sum();

    let initial_loss = loss_of(&mlp).elem();
    for _ in 0..31 {
        let loss = loss_of(&mlp);
        loss.backward();
        sgd_step(&mut mlp, RcTensor::scalar(1e-2)).unwrap();
    }
    let final_loss = loss_of(&mlp).elem();
    assert!(
        final_loss < initial_loss,
        "initial_loss={initial_loss}, final_loss={final_loss}"
    );
}

#[ignore] // slow: a few thousand backward passes
#[test]
fn test_mlp_fits_random_function() {
    use crate::optim::sgd::sgd_step;
    use crate::tensor::functional;
    use rand::prelude::*;
    use rand_distr::Normal;

    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let normal = Normal::new(0.0, 0.1).unwrap();
    let num_inputs = 4;
    let mut sample_vector = |shape: &[usize]| {
        RcTensor::new(
            (0..shape.iter().product::<usize>())
                .map(|_| normal.sample(&mut rng))
                .collect(),
            shape.to_vec(),
        )
    };
    let inputs: Vec<(RcTensor<f64>, RcTensor<f64>)> = (0..num_inputs)
        .map(|_| (sample_vector(&[1, 2]), sample_vector(&[1, 2])))
        .collect();
    let mut mlp = Mlp::new([
        Linear::new(
            sample_vector(&[2, 32]),
            sample_vector(&[1, 32]),
            Some(functional::relu),
        ),
        Linear::new(
            sample_vector(&[32, 2]),
            sample_vector(&[1, 2]),
            Some(functional::tanh),
        ),
    ]);
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    for _ in 0..2001 {
        let (input, expected) = &inputs[rng.gen::<usize>() % num_inputs];
        let loss = (&mlp.forward(input.clone()) - expected).abs().sum();
        loss.backward();
        sgd_step(&mut mlp, RcTensor::scalar(1e-3)).unwrap();
    }
    for (input, expected) in inputs.iter() {
        let loss = (&mlp.forward(input.clone()) - expected).abs().sum();
        assert!(loss.elem() < 0.2, "loss={loss}");
    }
}
