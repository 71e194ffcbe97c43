// External imports
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::{activation, backend::Backend, Tensor};

/// Single LSTM layer unrolled over the time dimension
///
/// All four gates (input, forget, cell, output) share one input projection and
/// one recurrent projection of width `4 * hidden_size`; the result is split per
/// gate at every step. The forward pass returns the hidden state at every time
/// step so that layers can be stacked.
#[derive(Module, Debug)]
pub struct LstmCell<B: Backend> {
    input_size: usize,
    hidden_size: usize,
    input_weights: Linear<B>,
    hidden_weights: Linear<B>,
}

impl<B: Backend> LstmCell<B> {
    pub fn new(input_size: usize, hidden_size: usize, device: &B::Device) -> Self {
        let gate_size = 4 * hidden_size;

        // The recurrent projection has no bias; the input projection carries it
        let input_weights = LinearConfig::new(input_size, gate_size).init(device);
        let hidden_weights = LinearConfig::new(hidden_size, gate_size)
            .with_bias(false)
            .init(device);

        Self {
            input_size,
            hidden_size,
            input_weights,
            hidden_weights,
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// `[batch, seq_len, input_size]` -> `[batch, seq_len, hidden_size]`
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch_size, seq_len, _] = x.dims();
        let device = x.device();

        // Initial hidden and cell states (zeros)
        let mut h = Tensor::<B, 2>::zeros([batch_size, self.hidden_size], &device);
        let mut c = Tensor::<B, 2>::zeros([batch_size, self.hidden_size], &device);
        let mut hidden_states = Vec::with_capacity(seq_len);

        for t in 0..seq_len {
            let x_t = x
                .clone()
                .narrow(1, t, 1)
                .reshape([batch_size, self.input_size]);

            let gates = self.input_weights.forward(x_t) + self.hidden_weights.forward(h);
            let mut gates = gates.chunk(4, 1).into_iter();
            let (i_gate, f_gate, g_gate, o_gate) = match (gates.next(), gates.next(), gates.next(), gates.next()) {
                (Some(i), Some(f), Some(g), Some(o)) => (i, f, g, o),
                _ => unreachable!("gate projection is 4 * hidden_size wide"),
            };

            let i = activation::sigmoid(i_gate);
            let f = activation::sigmoid(f_gate);
            let g = activation::tanh(g_gate);
            let o = activation::sigmoid(o_gate);

            c = f * c + i * g;
            h = o * activation::tanh(c.clone());
            hidden_states.push(h.clone());
        }

        Tensor::stack(hidden_states, 1)
    }
}
