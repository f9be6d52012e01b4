use rezero::nn::{Linear, Mlp, Module, ReZero, ReZeroConfig};
use rezero::optim::Sgd;
use rezero::tensor::{functional, RcTensor, TensorError};

use rand::prelude::*;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const SEED: u64 = 42;
const DEPTH: usize = 8;
const WIDTH: usize = 2;
const HIDDEN: usize = 32;
const STEPS: usize = 301;
const STEP_SIZE: f64 = 1e-2;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

fn main() -> Result<(), TensorError> {
    init_tracing();

    let mut rng = rand::rngs::StdRng::seed_from_u64(SEED);
    let config = ReZeroConfig::new(WIDTH);
    let mut blocks: Vec<ReZero<f64, Mlp<f64, 2>>> = (0..DEPTH)
        .map(|_| {
            let mlp = Mlp::new([
                Linear::init(WIDTH, HIDDEN, Some(functional::relu), &mut rng)?,
                Linear::init(HIDDEN, WIDTH, Some(functional::tanh), &mut rng)?,
            ]);
            config.init(mlp)
        })
        .collect::<Result<Vec<_>, _>>()?;
    info!(depth = DEPTH, params = blocks.params().len(), "built ReZero stack");

    let input = RcTensor::from([[1.0, 2.0]]);
    let expected = RcTensor::from([[-1.0, 1.0]]);
    let optimizer = Sgd::new(STEP_SIZE)?;

    for step in 0..STEPS {
        let res = blocks.try_forward(input.clone())?;
        let loss = functional::try_sub(&res, &expected)?.abs().sum();
        loss.backward();
        optimizer.step(&mut blocks)?;
        input.zero_grad();
        if step % 50 == 0 {
            info!(step, loss = loss.elem(), "training");
        }
    }

    for (i, block) in blocks.iter().enumerate() {
        println!("block {i}: alpha = {:.6}", block.alpha().elem());
    }
    println!("output = {}", blocks.try_forward(input)?);
    Ok(())
}
