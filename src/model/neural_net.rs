use ndarray::{Array, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::distributions::{Distribution, Uniform};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::{check_shapes, ensure_finite, Model};
use crate::error::{PipelineError, Result};

/// Feed-forward regressor: the configured hidden layers, one linear output unit
#[derive(Debug, Clone)]
pub struct NeuralNet {
    pub layers: Vec<(Array2<f64>, Array1<f64>)>, // Each layer holds a weight matrix and a bias vector
    pub hidden_layers: Vec<usize>,
    pub num_epochs: usize, // Training hyperparams
    pub batch_size: usize,
    pub learning_rate: f64,
    pub activation_function: ActivationFunction,
    pub init_method: InitMethod,
    /// Training stops once an epoch improves the loss by less than this
    pub epsilon: f64,
    pub seed: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationFunction {
    ReLU,
    Sigmoid,
    Tanh,
    Linear,
    LeakyReLU,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitMethod {
    Default,
    Xavier,
}

impl NeuralNet {
    /// Construct an untrained net according to the specified hyperparams
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hidden_layers: Vec<usize>,
        num_epochs: usize,
        batch_size: usize,
        learning_rate: f64,
        activation_function: ActivationFunction,
        init_method: InitMethod,
        epsilon: f64,
        seed: u64,
    ) -> NeuralNet {
        NeuralNet {
            layers: vec![],
            hidden_layers,
            num_epochs,
            batch_size: batch_size.max(1),
            learning_rate,
            activation_function,
            init_method,
            epsilon,
            seed,
        }
    }

    // Perform a forward pass of the network on some input.
    // Returns the outputs of every layer, and the non-activated outputs of the layers (used for backprop)
    fn forward(&self, inputs: &ArrayView2<'_, f64>) -> (Vec<Array2<f64>>, Vec<Array2<f64>>) {
        let mut hidden = Vec::with_capacity(self.layers.len() + 1);
        let mut hidden_linear = Vec::with_capacity(self.layers.len());
        // The first layer is a passthrough layer, so it outputs whatever its input is
        let mut current = inputs.to_owned();
        let last = self.layers.len().saturating_sub(1);

        for (idx, (weights, biases)) in self.layers.iter().enumerate() {
            // The output of the layer without applying the activation function
            let lin_output = current.dot(weights) + biases;
            // Hidden layers apply the activation function; the output layer is the identity
            let real_output = if idx == last {
                lin_output.clone()
            } else {
                lin_output.mapv(|z| activation(self.activation_function, z))
            };

            hidden.push(current);
            hidden_linear.push(lin_output);
            current = real_output;
        }
        hidden.push(current);

        (hidden, hidden_linear)
    }

    /// Calculate the gradients using backprop and perform a GD step
    fn backward_and_update(
        &mut self,
        hidden: Vec<Array2<f64>>,
        hidden_linear: Vec<Array2<f64>>,
        grad: Array2<f64>,
    ) {
        // The gradient WRT the current layer's linear output
        let mut grad_help = grad;

        for idx in (0..self.layers.len()).rev() {
            // Below the output layer the activation's derivative enters the chain
            if idx != self.layers.len() - 1 {
                let step_mat = hidden_linear[idx]
                    .mapv(|z| delta_activation(self.activation_function, z));
                grad_help = grad_help * step_mat;
            }

            // Gradient WRT the weights in the current layer
            let weight_grad = hidden[idx].t().dot(&grad_help);
            // Gradient WRT the biases in the current layer
            let bias_grad = grad_help.sum_axis(Axis(0));

            // Propagate before the weights change
            let next_grad = grad_help.dot(&self.layers[idx].0.t());

            let (weights, biases) = &mut self.layers[idx];
            weights.scaled_add(-self.learning_rate, &weight_grad);
            biases.scaled_add(-self.learning_rate, &bias_grad);

            grad_help = next_grad;
        }
    }

    fn mse(&self, x: &ArrayView2<'_, f64>, y: &ArrayView1<'_, f64>) -> f64 {
        let pred = self.predict(x);
        (&pred - y).mapv(|e| e * e).mean().unwrap_or(0.0)
    }
}

impl Model for NeuralNet {
    /// Mini-batch gradient descent on the squared error
    fn fit(&mut self, x: &ArrayView2<'_, f64>, y: &ArrayView1<'_, f64>) -> Result<()> {
        check_shapes(x, y)?;
        if let Some(pos) = self.hidden_layers.iter().position(|&w| w == 0) {
            return Err(PipelineError::Convergence(format!(
                "hidden layer {} has width 0 and cannot carry signal",
                pos + 1
            )));
        }

        let mut layer_structure = Vec::with_capacity(self.hidden_layers.len() + 2);
        layer_structure.push(x.ncols());
        layer_structure.extend_from_slice(&self.hidden_layers);
        layer_structure.push(1);

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        self.layers = match self.init_method {
            InitMethod::Default => init_layers_default(&layer_structure, &mut rng),
            InitMethod::Xavier => init_layers_xavier(&layer_structure, &mut rng),
        };

        let targets = y.to_owned().insert_axis(Axis(1));
        let mut order: Vec<usize> = (0..x.nrows()).collect();
        let mut previous = f64::INFINITY;

        for num_epoch in 0..self.num_epochs {
            order.shuffle(&mut rng);

            for batch in order.chunks(self.batch_size) {
                let input_batch = x.select(Axis(0), batch);
                let target_batch = targets.select(Axis(0), batch);
                let (hidden, hidden_linear) = self.forward(&input_batch.view());

                // Gradient of the mean squared error WRT the (linear) output layer
                let grad = match hidden.last() {
                    Some(output) => (output - &target_batch) / batch.len() as f64,
                    None => break,
                };

                self.backward_and_update(hidden, hidden_linear, grad);
            }

            let loss = self.mse(x, y);
            if !loss.is_finite() {
                return Err(PipelineError::Convergence(format!(
                    "training loss diverged at epoch {}",
                    num_epoch
                )));
            }

            if (previous - loss).abs() < self.epsilon {
                debug!(epoch = num_epoch, loss, "neural net converged");
                break;
            }
            previous = loss;
        }

        for (weights, biases) in &self.layers {
            ensure_finite("network weights", weights.iter().chain(biases.iter()))?;
        }

        Ok(())
    }

    /// Predict one value per row of "inputs"
    fn predict(&self, inputs: &ArrayView2<'_, f64>) -> Array1<f64> {
        let (hidden, _) = self.forward(inputs);
        match hidden.last() {
            Some(output) if !self.layers.is_empty() => output.column(0).to_owned(),
            _ => Array1::zeros(inputs.nrows()),
        }
    }
}

fn activation(name: ActivationFunction, z: f64) -> f64 {
    match name {
        ActivationFunction::ReLU => z.max(0f64),
        ActivationFunction::Sigmoid => (1f64 + (-z).exp()).recip(),
        ActivationFunction::Tanh => z.tanh(),
        ActivationFunction::Linear => z,
        ActivationFunction::LeakyReLU => z.max(0.01 * z),
    }
}

fn delta_activation(name: ActivationFunction, z: f64) -> f64 {
    match name {
        ActivationFunction::ReLU => {
            if z > 0f64 {
                1f64
            } else {
                0f64
            }
        }
        ActivationFunction::Sigmoid => activation(name, z) * (1f64 - activation(name, z)),
        ActivationFunction::Tanh => 1f64 - activation(name, z) * activation(name, z),
        ActivationFunction::Linear => 1f64,
        ActivationFunction::LeakyReLU => {
            if z > 0f64 {
                1f64
            } else {
                0.01f64
            }
        }
    }
}

fn init_layers_default(
    layer_structure: &[usize],
    rng: &mut ChaCha8Rng,
) -> Vec<(Array2<f64>, Array1<f64>)> {
    let mut layers = vec![];
    // Weights are initialized from a uniform distribution
    let distribution = Uniform::new(-0.3, 0.3);

    for pair in layer_structure.windows(2) {
        // Random matrix of the weights between this layer and the next layer
        let weights =
            Array::from_shape_simple_fn((pair[0], pair[1]), || distribution.sample(&mut *rng));
        // Bias vector between this layer and the next layer. Init'd to ones
        let bias = Array::ones(pair[1]);

        layers.push((weights, bias));
    }

    layers
}

fn init_layers_xavier(
    layer_structure: &[usize],
    rng: &mut ChaCha8Rng,
) -> Vec<(Array2<f64>, Array1<f64>)> {
    let mut layers = vec![];

    for pair in layer_structure.windows(2) {
        let boundary = (6f64 / (pair[0] + pair[1]) as f64).sqrt();
        let dist = Uniform::new(-boundary, boundary);

        let weights = Array::from_shape_simple_fn((pair[0], pair[1]), || dist.sample(&mut *rng));
        let bias = Array::zeros(pair[1]);

        layers.push((weights, bias));
    }

    layers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::rmse;
    use ndarray::Array2;

    fn net(hidden: Vec<usize>, seed: u64) -> NeuralNet {
        NeuralNet::new(
            hidden,
            1000,
            16,
            0.3,
            ActivationFunction::Sigmoid,
            InitMethod::Xavier,
            1e-9,
            seed,
        )
    }

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((64, 2), |(i, j)| ((i * (j + 2)) % 9) as f64 / 8.0);
        let y = x.column(0).mapv(|v| 0.6 * v + 0.2) + x.column(1).mapv(|v| 0.2 * v);
        (x, y)
    }

    #[test]
    fn learns_a_linear_target() {
        let (x, y) = data();
        let mut model = net(vec![5, 3], 11);
        model.fit(&x.view(), &y.view()).unwrap();

        let baseline = Array1::from_elem(y.len(), y.mean().unwrap());
        let pred = model.predict(&x.view());
        assert!(rmse(&pred.view(), &y.view()) < 0.5 * rmse(&baseline.view(), &y.view()));
    }

    #[test]
    fn same_seed_same_weights() {
        let (x, y) = data();
        let mut a = net(vec![5, 3], 3);
        let mut b = net(vec![5, 3], 3);
        a.fit(&x.view(), &y.view()).unwrap();
        b.fit(&x.view(), &y.view()).unwrap();
        assert_eq!(a.layers, b.layers);
    }

    #[test]
    fn zero_width_layer_fails_to_converge() {
        let (x, y) = data();
        let mut model = net(vec![5, 0], 1);
        let err = model.fit(&x.view(), &y.view()).unwrap_err();
        assert!(matches!(err, PipelineError::Convergence(_)));
    }

    #[test]
    fn linear_activation_is_identity() {
        assert_eq!(activation(ActivationFunction::Linear, 2.5), 2.5);
        assert_eq!(delta_activation(ActivationFunction::Linear, 2.5), 1.0);
        assert!((activation(ActivationFunction::Sigmoid, 0.0) - 0.5).abs() < 1e-12);
    }
}
