//! Butterfly FFT as a chain of compute passes.
//!
//! All four planes live in one storage buffer and are transformed together:
//! `log2(N)` horizontal passes followed by `log2(N)` vertical ones, ping-ponging
//! between two buffers. The pass count is even, so the result always ends up
//! back in the first buffer.

use std::sync::mpsc;

use bytemuck::{Pod, Zeroable};
use log::{debug, info};
use rustfft::num_complex::Complex32;
use wgpu::util::DeviceExt;

use super::{ButterflyTables, SpectrumTransform, SurfaceFields, TimedSpectrum, PLANES};
use crate::error::{Result, WaterError};

const WORKGROUP_SIZE: u32 = 8;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct PassParams {
    resolution: u32,
    stage: u32,
    horizontal: u32,
    planes: u32,
}

/// Buffers and bind groups for one resolution
struct FftResources {
    resolution: usize,
    ping: wgpu::Buffer,
    staging: wgpu::Buffer,
    /// One per pass, alternating source and destination
    passes: Vec<wgpu::BindGroup>,
    byte_size: u64,
}

pub struct GpuSpectrumTransform {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    resources: Option<FftResources>,
}

impl GpuSpectrumTransform {
    /// Request a headless device and build the butterfly pipeline.
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::request())
    }

    async fn request() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(WaterError::AdapterUnavailable)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Spectrum FFT Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| WaterError::Device(e.to_string()))?;

        info!("GPU FFT on {}", adapter.get_info().name);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Butterfly Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/butterfly.wgsl").into()),
        });

        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Butterfly Bind Group Layout"),
            entries: &[
                storage(0, true),
                storage(1, false),
                storage(2, true),
                storage(3, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Butterfly Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Butterfly Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            resources: None,
        })
    }

    fn create_resources(&self, resolution: usize) -> Result<FftResources> {
        let tables = ButterflyTables::new(resolution)?;
        let byte_size = (PLANES * resolution * resolution * std::mem::size_of::<[f32; 2]>()) as u64;
        if byte_size > u64::from(self.device.limits().max_storage_buffer_binding_size) {
            return Err(WaterError::InvalidResolution(resolution));
        }
        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC;

        let ping = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("FFT Ping Buffer"),
            size: byte_size,
            usage,
            mapped_at_creation: false,
        });
        let pong = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("FFT Pong Buffer"),
            size: byte_size,
            usage,
            mapped_at_creation: false,
        });
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("FFT Staging Buffer"),
            size: byte_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let indices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Butterfly Indices"),
            contents: bytemuck::cast_slice(tables.indices()),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let weights = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Butterfly Weights"),
            contents: bytemuck::cast_slice(&tables.weight_pairs()),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let stages = tables.stages();
        let mut passes = Vec::with_capacity(2 * stages);
        for pass in 0..2 * stages {
            let params = PassParams {
                resolution: resolution as u32,
                stage: (pass % stages) as u32,
                horizontal: u32::from(pass < stages),
                planes: PLANES as u32,
            };
            let params_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Butterfly Params"),
                contents: bytemuck::cast_slice(&[params]),
                usage: wgpu::BufferUsages::UNIFORM,
            });

            let (src, dst) = if pass % 2 == 0 { (&ping, &pong) } else { (&pong, &ping) };
            passes.push(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Butterfly Bind Group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: src.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: dst.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: indices.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: weights.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: params_buffer.as_entire_binding(),
                    },
                ],
            }));
        }

        debug!("GPU FFT resources for {}x{} ({} passes)", resolution, resolution, passes.len());

        Ok(FftResources {
            resolution,
            ping,
            staging,
            passes,
            byte_size,
        })
    }

    /// Run all passes over `planes` and read the result back.
    fn run(&mut self, resolution: usize, planes: &[Complex32]) -> Result<Vec<Complex32>> {
        if self.resources.as_ref().map(|r| r.resolution) != Some(resolution) {
            self.resources = Some(self.create_resources(resolution)?);
        }
        let Some(resources) = self.resources.as_ref() else {
            return Err(WaterError::InvalidResolution(resolution));
        };

        let upload: Vec<[f32; 2]> = planes.iter().map(|c| [c.re, c.im]).collect();
        self.queue
            .write_buffer(&resources.ping, 0, bytemuck::cast_slice(&upload));

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("FFT Encoder"),
        });

        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("FFT Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipeline);

            let groups = (resolution as u32).div_ceil(WORKGROUP_SIZE);
            for bind_group in &resources.passes {
                compute_pass.set_bind_group(0, bind_group, &[]);
                compute_pass.dispatch_workgroups(groups, groups, PLANES as u32);
            }
        }

        encoder.copy_buffer_to_buffer(&resources.ping, 0, &resources.staging, 0, resources.byte_size);
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = resources.staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|e| WaterError::BufferMap(e.to_string()))?
            .map_err(|e| WaterError::BufferMap(e.to_string()))?;

        let data = buffer_slice.get_mapped_range();
        let result = bytemuck::cast_slice::<u8, [f32; 2]>(&data)
            .iter()
            .map(|&[re, im]| Complex32::new(re, im))
            .collect();

        drop(data);
        resources.staging.unmap();

        Ok(result)
    }
}

impl SpectrumTransform for GpuSpectrumTransform {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn transform(&mut self, spectrum: &TimedSpectrum) -> Result<SurfaceFields> {
        let planes = self.run(spectrum.resolution, &spectrum.planes)?;
        Ok(SurfaceFields::from_planes(
            spectrum.resolution,
            spectrum.tile_size,
            spectrum.time,
            &planes,
        ))
    }
}
