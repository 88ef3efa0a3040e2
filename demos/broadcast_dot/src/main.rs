// Example: Broadcasting, dot products and axis reductions
//
// Walks through the tensor kernels as graph nodes:
//
//   1. linspace reshaped into a matrix
//   2. row (1,3) + column (3,1) broadcast into a (3,3) grid
//   3. outer product (8,1) . (1,8) through the faer-backed dot
//   4. sum / max / softmax along one axis of a rank-4 tensor
//   5. slices that alias their parent
//   6. an incompatible broadcast reported as a recoverable error

use bolt::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let session = Session::default();

    //  1. linspace
    let grid = Tensor::linspace(0.0, 1.0, 6)?.reshaped((2, 3))?;
    println!("linspace(0, 1, 6) as {}:\n{}\n", grid.shape(), grid);

    //  2. broadcast add
    let values = Tensor::linspace(0.0, 1.0, 3)?;
    let row = Node::constant(values.clone().reshaped((1, 3))?);
    let col = Node::constant(values.reshaped((3, 1))?);
    let sum = session.run(&Graph::new("broadcast", &row.add(&col)), &[])?;
    println!("(1,3) + (3,1) =\n{}\n", sum);

    //  3. outer product
    let v = Tensor::linspace(0.0, 1.0, 8)?;
    let lhs = Node::constant(v.clone().reshaped((8, 1))?);
    let rhs = Node::constant(v.reshaped((1, 8))?);
    let outer = session.run(&Graph::new("outer", &lhs.dot(&rhs)), &[])?;
    println!("outer product {}:\n{}\n", outer.shape(), outer);

    //  4. axis-bound ops
    let mut rng = StdRng::seed_from_u64(0);
    let x = Node::constant(Tensor::random_normal((3, 3, 3, 2), 0.0, 1.0, &mut rng));
    let summed = session.run_node(&x.sum(1))?;
    let maxed = session.run_node(&x.max(3))?;
    let soft = session.run_node(&x.softmax(3))?;
    println!("sum over axis 1: {}", summed.shape());
    println!("max over axis 3: {}", maxed.shape());
    println!("softmax over axis 3: {}\n", soft.shape());

    //  5. slices alias their parent
    let mut parent = Tensor::alloc((3, 3));
    {
        let mut corner = parent.slice_mut(&[(0, 2), (0, 2)])?;
        corner.fill(1.0);
    }
    let middle = parent.slice(&[(1, 1), (0, 3)])?;
    println!("after filling the top-left 2x2 view:\n{}", parent);
    println!("row 1 through a view: {:?}\n", middle.to_vec());

    //  6. recoverable shape error
    let bad = Node::constant(Tensor::ones((2, 3))).add(&Node::constant(Tensor::ones((4, 5))));
    match session.run(&Graph::new("mismatch", &bad), &[]) {
        Ok(t) => println!("unexpected success: {}", t),
        Err(err) => {
            tracing::warn!(kind = %err.kind, "broadcast rejected");
            println!("recovered: {}", err);
        }
    }

    Ok(())
}
