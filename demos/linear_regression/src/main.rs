// Example: Linear Regression through the Autograd Engine
//
// Fits y = 2*x + 1 from noisy samples. The model is one graph:
//
//   pred = x . w + b          (20,1) . (1,1) + ()   broadcast add
//   loss = sum((pred - y)^2) / n
//
// Each step binds the current parameters into the graph, runs it and
// differentiates. A run starts every node from a zeroed gradient. The gradient at `b` is summed back over
// the batch axis by the engine, since `b` was broadcast to (20,1).
//
// Set RUST_LOG=bolt=debug to see session runs and backward passes.

use bolt::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

const SAMPLES: usize = 20;
const EPOCHS: usize = 200;
const LR: f64 = 0.1;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!(" Bolt Linear Regression with Autograd \n");

    //  Step 1: Synthetic data
    let mut rng = StdRng::seed_from_u64(42);
    let x_t = Tensor::linspace(-1.0, 1.0, SAMPLES)?.reshaped((SAMPLES, 1))?;
    let noise = Tensor::random_normal((SAMPLES, 1), 0.0, 0.05, &mut rng);
    let y_t = Tensor::from_vec(
        x_t.to_vec()
            .iter()
            .zip(noise.to_vec())
            .map(|(x, e)| 2.0 * x + 1.0 + e)
            .collect(),
        (SAMPLES, 1),
    )?;
    println!("Input X shape: {:?}", x_t.dims());
    println!("Target Y shape: {:?}", y_t.dims());

    //  Step 2: The graph
    let x = Node::constant(x_t);
    let y = Node::constant(y_t);
    let w = Node::variable("w");
    let b = Node::variable("b");
    let diff = x.dot(&w).add(&b).sub(&y);
    let loss = diff
        .mul(&diff)
        .sum(1)
        .sum(0)
        .div(&Node::scalar(SAMPLES as f64));
    let graph = Graph::new("linear_regression", &loss);

    //  Step 3: Training loop
    let session = Session::default();
    tracing::info!(epochs = EPOCHS, lr = LR, samples = SAMPLES, "training");
    let mut w_val = 0.0_f64;
    let mut b_val = 0.0_f64;

    for epoch in 0..EPOCHS {
        let w_node = Node::constant(Tensor::fill((1, 1), w_val));
        let b_node = Node::scalar(b_val);

        let loss_val = session.run(&graph, &[(w_node.clone(), "w"), (b_node.clone(), "b")])?;
        session.backward(&graph)?;

        let grad_w = w_node.grad().and_then(|g| g.scalar_value()).unwrap_or(0.0);
        let grad_b = b_node.grad().and_then(|g| g.scalar_value()).unwrap_or(0.0);

        if epoch % 20 == 0 {
            println!(
                "Epoch {:3}: loss = {:.6}, w = {:.4}, b = {:.4}  (grad_w = {:.4}, grad_b = {:.4})",
                epoch,
                loss_val.scalar_value().unwrap_or(f64::NAN),
                w_val,
                b_val,
                grad_w,
                grad_b,
            );
        }

        //  Step 4: Gradient descent update
        w_val -= LR * grad_w;
        b_val -= LR * grad_b;
    }

    println!(
        "\nFinal: w = {:.4} (expected 2.0), b = {:.4} (expected 1.0)",
        w_val, b_val
    );

    graph.release();
    Ok(())
}
