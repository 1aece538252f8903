use candle_core::{DType, Device, Result, Shape, Tensor, shape::Dim};

pub struct RunningMeanStd {
    pub mean: Tensor,
    pub var: Tensor,
    pub count: f32,
    pub device: Device,
}

pub fn biased_var<D: Dim>(t: &Tensor, dim: D) -> Result<Tensor> {
    let dim = dim.to_index(t.shape(), "var")?;
    let mean = t.mean_keepdim(dim)?;
    let squares = t.broadcast_sub(&mean)?.sqr()?;
    (squares.sum_keepdim(dim)? / t.dim(dim)? as f64)?.squeeze(dim)
}

impl RunningMeanStd {
    pub fn new<S: Into<Shape> + Copy>(shape: S, device: Device) -> Result<Self> {
        let mean = Tensor::zeros(shape, DType::F32, &device)?;
        let var = Tensor::zeros(shape, DType::F32, &device)?;
        Ok(Self {
            mean,
            var,
            count: 0.,
            device,
        })
    }

    pub fn update(&mut self, arr: &Tensor) -> Result<()> {
        let batch_mean = arr.mean(0)?;
        let batch_var = biased_var(arr, 0)?;
        let batch_count = arr.shape().dim(0)? as f32;
        self.update_from_moments(batch_mean, batch_var, batch_count)
    }

    // implements Welford's algorithm
    fn update_from_moments(
        &mut self,
        batch_mean: Tensor,
        batch_var: Tensor,
        batch_count: f32,
    ) -> Result<()> {
        let delta = batch_mean.sub(&self.mean)?;
        let tot_count = self.count + batch_count;
        self.mean = self.mean.add(
            &delta.broadcast_mul(&Tensor::full(batch_count / tot_count, (), &self.device)?)?,
        )?;
        let m_a = self
            .var
            .broadcast_mul(&Tensor::full(self.count, (), &self.device)?)?;
        let m_b = batch_var.broadcast_mul(&Tensor::full(batch_count, (), &self.device)?)?;
        let m_2 = m_a.add(&m_b)?.add(&delta.sqr()?.broadcast_mul(&Tensor::full(
            self.count * batch_count / tot_count,
            (),
            &self.device,
        )?)?)?;
        self.var = m_2.broadcast_mul(&Tensor::full(1. / tot_count, (), &self.device)?)?;
        self.count = tot_count;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{RunningMeanStd, biased_var};
    use candle_core::{Device, Result, Tensor};
    use rand::Rng;

    #[test]
    fn biased_var_matches_population_variance() -> Result<()> {
        // columns [1, 3, 8] and [2, 5, 2]: means 4 and 3, population
        // variances 26/3 and 2
        let test_t = Tensor::from_slice(&[1f32, 2., 3., 5., 8., 2.], (3, 2), &Device::Cpu)?;
        let var = biased_var(&test_t, 0)?;
        let reference_var = Tensor::from_slice(&[26f32 / 3., 2.], 2, &Device::Cpu)?;
        let var_diff = (&var - &reference_var)?.abs()?.max(0)?;
        assert!(var_diff.to_scalar::<f32>()? < 1e-5, "var diff");
        Ok(())
    }

    #[test]
    fn running_moments_match_whole_batch_moments() -> Result<()> {
        let device = Device::Cpu;
        let mut rng = rand::rng();
        let shape = (10, 3);
        let mut rms = RunningMeanStd::new(shape.1, device.clone())?;
        let mut all_data = vec![];

        for _ in 0..100 {
            let data: Vec<f32> = (0..30).map(|_| rng.random_range(-1.0..1.0)).collect();
            let tensor = Tensor::from_slice(&data, shape, &device)?;
            rms.update(&tensor)?;
            all_data.extend(data);
        }

        let all_tensor = Tensor::from_slice(&all_data, (all_data.len() / 3, 3), &device)?;
        let reference_mean = all_tensor.mean(0)?;
        let reference_var = biased_var(&all_tensor, 0)?;

        let mean_diff = (&rms.mean - &reference_mean)?.abs()?.max(0)?;
        let var_diff = (&rms.var - &reference_var)?.abs()?.max(0)?;

        let eps = 1e-5;
        assert!(mean_diff.to_scalar::<f32>()? < eps, "mean mismatch");
        assert!(var_diff.to_scalar::<f32>()? < eps, "variance mismatch");
        Ok(())
    }
}
