use mnist_cnn::{config::TrainingConfig, logging, MnistError};

#[cfg(any(feature = "ndarray", feature = "ndarray-blas-openblas"))]
mod ndarray {
    use burn::backend::{
        ndarray::{NdArray, NdArrayDevice},
        Autodiff,
    };
    use mnist_cnn::{config::TrainingConfig, training, MnistError};

    pub fn run(config: &TrainingConfig) -> Result<(), MnistError> {
        let device = NdArrayDevice::Cpu;
        training::run::<Autodiff<NdArray>>(config, device)?;
        Ok(())
    }
}

#[cfg(feature = "tch-gpu")]
mod tch_gpu {
    use burn::backend::{
        libtorch::{LibTorch, LibTorchDevice},
        Autodiff,
    };
    use mnist_cnn::{config::TrainingConfig, training, MnistError};

    pub fn run(config: &TrainingConfig) -> Result<(), MnistError> {
        #[cfg(not(target_os = "macos"))]
        let device = LibTorchDevice::Cuda(0);
        #[cfg(target_os = "macos")]
        let device = LibTorchDevice::Mps;

        training::run::<Autodiff<LibTorch>>(config, device)?;
        Ok(())
    }
}

#[cfg(feature = "tch-cpu")]
mod tch_cpu {
    use burn::backend::{
        libtorch::{LibTorch, LibTorchDevice},
        Autodiff,
    };
    use mnist_cnn::{config::TrainingConfig, training, MnistError};

    pub fn run(config: &TrainingConfig) -> Result<(), MnistError> {
        let device = LibTorchDevice::Cpu;
        training::run::<Autodiff<LibTorch>>(config, device)?;
        Ok(())
    }
}

#[cfg(feature = "wgpu")]
mod wgpu {
    use burn::backend::{
        wgpu::{Wgpu, WgpuDevice},
        Autodiff,
    };
    use mnist_cnn::{config::TrainingConfig, training, MnistError};

    pub fn run(config: &TrainingConfig) -> Result<(), MnistError> {
        let device = WgpuDevice::default();
        training::run::<Autodiff<Wgpu>>(config, device)?;
        Ok(())
    }
}

/// Reads the optional config file path, the only accepted argument.
fn load_config() -> Result<TrainingConfig, MnistError> {
    let mut args = std::env::args().skip(1);
    let path = args.next();

    if args.next().is_some() {
        return Err(MnistError::Usage("mnist-cnn [CONFIG_JSON]".into()));
    }

    match path {
        Some(path) => {
            log::info!("Loading training config from {path}");
            TrainingConfig::from_file(path)
        }
        None => Ok(TrainingConfig::default()),
    }
}

fn main() -> Result<(), MnistError> {
    logging::init();

    let config = load_config()?;
    log::info!("Training config: {config}");

    #[cfg(any(feature = "ndarray", feature = "ndarray-blas-openblas"))]
    ndarray::run(&config)?;
    #[cfg(feature = "tch-gpu")]
    tch_gpu::run(&config)?;
    #[cfg(feature = "tch-cpu")]
    tch_cpu::run(&config)?;
    #[cfg(feature = "wgpu")]
    wgpu::run(&config)?;

    Ok(())
}
