//! wgpu backend: pipelines, per-stroke vertex buffers and instanced quads.

use std::{mem, ops::Range};

use anyhow::Context;
use bytemuck::NoUninit;
use wgpu::{
    util::{BufferInitDescriptor, DeviceExt},
    Adapter, BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout,
    BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingResource, BindingType, BlendComponent,
    BlendFactor, BlendOperation, BlendState, Buffer, BufferBindingType, BufferDescriptor,
    BufferUsages, Color, ColorTargetState, ColorWrites, CommandEncoder, Device, DeviceDescriptor,
    Extent3d, FilterMode, FragmentState, LoadOp, MemoryHints, MultisampleState, Operations,
    PipelineLayout, PipelineLayoutDescriptor, PrimitiveState, PrimitiveTopology, Queue,
    RenderPass, RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline,
    RenderPipelineDescriptor, RequestAdapterOptions, Sampler, SamplerBindingType,
    SamplerDescriptor, ShaderModule, ShaderModuleDescriptor, ShaderSource, ShaderStages, Surface,
    SurfaceConfiguration, Texture, TextureDescriptor, TextureDimension, TextureFormat,
    TextureSampleType, TextureUsages, TextureView, TextureViewDimension, VertexAttribute,
    VertexBufferLayout, VertexState, VertexStepMode,
};

use crate::{geometry::Vertex, math::Vec2f, stroke::Stroke};

/// Quad instances preallocated per batch.
const INITIAL_QUADS: usize = 64;

const STROKE_ATTRIBUTES: [VertexAttribute; 5] = wgpu::vertex_attr_array![
    0 => Float32x2,
    1 => Float32x3,
    2 => Float32x2,
    3 => Float32,
    4 => Float32,
];

const CORNER_ATTRIBUTES: [VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

/// Corners of the unit quad, in triangle strip order.
const UNIT_QUAD: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];

/// Destination-out: erases whatever is already in the target, proportional
/// to source coverage.
const ERASE_BLENDING: BlendState = BlendState {
    color: BlendComponent {
        src_factor: BlendFactor::Zero,
        dst_factor: BlendFactor::OneMinusSrcAlpha,
        operation: BlendOperation::Add,
    },
    alpha: BlendComponent {
        src_factor: BlendFactor::Zero,
        dst_factor: BlendFactor::OneMinusSrcAlpha,
        operation: BlendOperation::Add,
    },
};

/// Per-frame shader constants.
#[derive(Debug, Clone, Copy, NoUninit)]
#[repr(C)]
pub struct Uniforms {
    /// World to clip space.
    pub world: [[f32; 4]; 4],
    /// Screen pixels to clip space.
    pub screen: [[f32; 4]; 4],
    /// Viewport width and height, world units per pixel, grid spacing.
    pub params: [f32; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QuadKind {
    Rect = 0,
    Disc = 1,
    Ring = 2,
    Grid = 3,
}

/// Coordinate space a quad's rectangle is given in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Space {
    Screen = 0,
    World = 1,
}

/// One instanced quad, laid out to match the shader's storage buffer.
#[derive(Debug, Clone, Copy, PartialEq, NoUninit)]
#[repr(C)]
pub struct QuadInstance {
    /// Top-left (screen) or bottom-left (world) corner, then width and height.
    rect: [f32; 4],
    /// Straight (not premultiplied) RGBA.
    color: [f32; 4],
    kind: u32,
    space: u32,
    _padding: [u32; 2],
}

impl QuadInstance {
    pub fn new(kind: QuadKind, space: Space, min: Vec2f, size: Vec2f, color: [f32; 4]) -> Self {
        Self {
            rect: [min.x(), min.y(), size.x(), size.y()],
            color,
            kind: kind as u32,
            space: space as u32,
            _padding: [0; 2],
        }
    }

    /// A circle of the given radius, as a disc or a ring.
    pub fn circle(kind: QuadKind, space: Space, center: Vec2f, radius: f32, color: [f32; 4]) -> Self {
        let r = Vec2f::from([radius, radius]);
        Self::new(kind, space, center - r, r + r, color)
    }
}

pub struct Gpu {
    pub adapter: Adapter,
    pub device: Device,
    pub queue: Queue,
    /// Format of the window surface, used as the format of every render target.
    pub format: TextureFormat,

    stroke_paint: RenderPipeline,
    stroke_erase: RenderPipeline,
    quad_paint: RenderPipeline,
    quad_erase: RenderPipeline,
    composite: RenderPipeline,

    /// Shared by every quad draw; created once here and owned by the device wrapper.
    unit_quad: Buffer,
    uniform_buf: Buffer,
    uniforms_bg: BindGroup,
    instances_bgl: BindGroupLayout,
    layer_bgl: BindGroupLayout,
    sampler: Sampler,
}

impl Gpu {
    pub fn new(
        instance: &wgpu::Instance,
        surface: &Surface<'_>,
        width: u32,
        height: u32,
    ) -> anyhow::Result<(Self, SurfaceConfiguration)> {
        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            compatible_surface: Some(surface),
            ..Default::default()
        }))
        .context("failed to find a supported graphics adapter")?;

        let (device, queue) = pollster::block_on(adapter.request_device(&DeviceDescriptor {
            label: Some("inkstrip"),
            memory_hints: MemoryHints::MemoryUsage,
            ..Default::default()
        }))?;

        let config = surface
            .get_default_config(&adapter, width.max(1), height.max(1))
            .context("adapter does not support the window surface")?;

        log::info!(
            "using adapter {:?} ({:?})",
            adapter.get_info().name,
            adapter.get_info().backend,
        );

        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("shader"),
            source: ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });

        // BGLs
        let uniforms_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("uniforms"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                count: None,
                visibility: ShaderStages::VERTEX_FRAGMENT,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
            }],
        });
        let instances_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("instances"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                count: None,
                visibility: ShaderStages::VERTEX_FRAGMENT,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
            }],
        });
        let layer_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("layer"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 1,
                    count: None,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(SamplerBindingType::Filtering),
                },
                BindGroupLayoutEntry {
                    binding: 2,
                    count: None,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: true },
                        view_dimension: TextureViewDimension::D2,
                        multisampled: false,
                    },
                },
            ],
        });

        let stroke_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("stroke"),
            bind_group_layouts: &[&uniforms_bgl],
            push_constant_ranges: &[],
        });
        let quad_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("quad"),
            bind_group_layouts: &[&uniforms_bgl, &instances_bgl],
            push_constant_ranges: &[],
        });
        let composite_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("composite"),
            bind_group_layouts: &[&layer_bgl],
            push_constant_ranges: &[],
        });

        let stroke_buffers = [VertexBufferLayout {
            array_stride: mem::size_of::<Vertex>() as u64,
            step_mode: VertexStepMode::Vertex,
            attributes: &STROKE_ATTRIBUTES,
        }];
        let quad_buffers = [VertexBufferLayout {
            array_stride: mem::size_of::<[f32; 2]>() as u64,
            step_mode: VertexStepMode::Vertex,
            attributes: &CORNER_ATTRIBUTES,
        }];

        let pipeline = |label: &str,
                        layout: &PipelineLayout,
                        entry: (&str, &str),
                        buffers: &[VertexBufferLayout<'_>],
                        blend: BlendState| {
            create_pipeline(&device, &shader, config.format, label, layout, entry, buffers, blend)
        };
        let stroke_paint = pipeline(
            "stroke_paint",
            &stroke_layout,
            ("vs_stroke", "fs_stroke"),
            &stroke_buffers,
            BlendState::PREMULTIPLIED_ALPHA_BLENDING,
        );
        let stroke_erase = pipeline(
            "stroke_erase",
            &stroke_layout,
            ("vs_stroke", "fs_stroke"),
            &stroke_buffers,
            ERASE_BLENDING,
        );
        let quad_paint = pipeline(
            "quad_paint",
            &quad_layout,
            ("vs_quad", "fs_quad"),
            &quad_buffers,
            BlendState::PREMULTIPLIED_ALPHA_BLENDING,
        );
        let quad_erase = pipeline(
            "quad_erase",
            &quad_layout,
            ("vs_quad", "fs_quad"),
            &quad_buffers,
            ERASE_BLENDING,
        );
        let composite = pipeline(
            "composite",
            &composite_layout,
            ("vs_composite", "fs_composite"),
            &[],
            BlendState::PREMULTIPLIED_ALPHA_BLENDING,
        );

        let unit_quad = device.create_buffer_init(&BufferInitDescriptor {
            label: Some("unit_quad"),
            contents: bytemuck::cast_slice(&UNIT_QUAD),
            usage: BufferUsages::VERTEX,
        });
        let uniform_buf = device.create_buffer(&BufferDescriptor {
            label: Some("uniforms"),
            size: mem::size_of::<Uniforms>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniforms_bg = device.create_bind_group(&BindGroupDescriptor {
            label: Some("uniforms"),
            layout: &uniforms_bgl,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer(uniform_buf.as_entire_buffer_binding()),
            }],
        });
        let sampler = device.create_sampler(&SamplerDescriptor {
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            ..Default::default()
        });

        let gpu = Gpu {
            adapter,
            device,
            queue,
            format: config.format,
            stroke_paint,
            stroke_erase,
            quad_paint,
            quad_erase,
            composite,
            unit_quad,
            uniform_buf,
            uniforms_bg,
            instances_bgl,
            layer_bgl,
            sampler,
        };
        Ok((gpu, config))
    }

    /// Written once per frame, before any pass is recorded.
    pub fn write_uniforms(&self, uniforms: &Uniforms) {
        self.queue
            .write_buffer(&self.uniform_buf, 0, bytemuck::bytes_of(uniforms));
    }

    /// Copies `vertices` into the stroke's buffer, replacing it when it is too small.
    pub fn upload_vertices(&self, vertices: &[Vertex], slot: &mut Option<StrokeBuffer>) {
        if vertices.is_empty() {
            return;
        }

        let size = mem::size_of_val(vertices) as u64;
        if slot.as_ref().map_or(true, |buffer| buffer.capacity < size) {
            // Grow geometrically; live strokes are re-uploaded every few samples.
            let capacity = size.next_power_of_two();
            *slot = Some(StrokeBuffer {
                buffer: self.device.create_buffer(&BufferDescriptor {
                    label: Some("stroke"),
                    size: capacity,
                    usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }),
                capacity,
            });
        }
        if let Some(buffer) = slot {
            self.queue
                .write_buffer(&buffer.buffer, 0, bytemuck::cast_slice(vertices));
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn create_pipeline(
    device: &Device,
    shader: &ShaderModule,
    format: TextureFormat,
    label: &str,
    layout: &PipelineLayout,
    (vs, fs): (&str, &str),
    buffers: &[VertexBufferLayout<'_>],
    blend: BlendState,
) -> RenderPipeline {
    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: VertexState {
            module: shader,
            entry_point: Some(vs),
            compilation_options: Default::default(),
            buffers,
        },
        primitive: PrimitiveState {
            topology: PrimitiveTopology::TriangleStrip,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: MultisampleState::default(),
        fragment: Some(FragmentState {
            module: shader,
            entry_point: Some(fs),
            compilation_options: Default::default(),
            targets: &[Some(ColorTargetState {
                format,
                blend: Some(blend),
                write_mask: ColorWrites::ALL,
            })],
        }),
        multiview: None,
        cache: None,
    })
}

/// GPU vertex buffer exclusively owned by one stroke.
///
/// Not `Clone`: the buffer is released when its owner drops it, exactly once.
#[derive(Debug)]
pub struct StrokeBuffer {
    buffer: Buffer,
    /// Size in bytes.
    capacity: u64,
}

/// Offscreen target the strokes are painted into, so erasing never touches
/// the background.
pub struct Layer {
    texture: Texture,
    view: TextureView,
    bind_group: BindGroup,
}

impl Layer {
    pub fn new(gpu: &Gpu, width: u32, height: u32) -> Self {
        let texture = gpu.device.create_texture(&TextureDescriptor {
            label: Some("layer"),
            size: Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: gpu.format,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&Default::default());
        let bind_group = gpu.device.create_bind_group(&BindGroupDescriptor {
            label: Some("layer"),
            layout: &gpu.layer_bgl,
            entries: &[
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::Sampler(&gpu.sampler),
                },
                BindGroupEntry {
                    binding: 2,
                    resource: BindingResource::TextureView(&view),
                },
            ],
        });
        Self {
            texture,
            view,
            bind_group,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }
}

/// Quad instances for one frame, uploaded together and drawn in ranges.
pub struct QuadBatch {
    instances: Vec<QuadInstance>,
    buffer: Buffer,
    bind_group: BindGroup,
}

impl QuadBatch {
    pub fn new(gpu: &Gpu) -> Self {
        let (buffer, bind_group) = Self::create_buffer(gpu, INITIAL_QUADS);
        Self {
            instances: Vec::new(),
            buffer,
            bind_group,
        }
    }

    fn create_buffer(gpu: &Gpu, count: usize) -> (Buffer, BindGroup) {
        let buffer = gpu.device.create_buffer(&BufferDescriptor {
            label: Some("quads"),
            size: (mem::size_of::<QuadInstance>() * count) as u64,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = gpu.device.create_bind_group(&BindGroupDescriptor {
            label: Some("quads"),
            layout: &gpu.instances_bgl,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer(buffer.as_entire_buffer_binding()),
            }],
        });
        (buffer, bind_group)
    }

    pub fn clear(&mut self) {
        self.instances.clear();
    }

    /// Appends quads and returns their instance range.
    pub fn push(&mut self, quads: impl IntoIterator<Item = QuadInstance>) -> Range<u32> {
        let start = self.instances.len() as u32;
        self.instances.extend(quads);
        start..self.instances.len() as u32
    }

    pub fn upload(&mut self, gpu: &Gpu) {
        let size = mem::size_of_val(self.instances.as_slice()) as u64;
        if self.buffer.size() < size {
            let count = self.instances.len().next_power_of_two();
            log::debug!("growing quad buffer to {count} instances");
            (self.buffer, self.bind_group) = Self::create_buffer(gpu, count);
        }
        if !self.instances.is_empty() {
            gpu.queue
                .write_buffer(&self.buffer, 0, bytemuck::cast_slice(&self.instances));
        }
    }
}

pub struct Pass<'a> {
    gpu: &'a Gpu,
    pass: RenderPass<'a>,
}

impl<'a> Pass<'a> {
    pub fn new(
        gpu: &'a Gpu,
        enc: &'a mut CommandEncoder,
        target: &TextureView,
        clear: Option<Color>,
    ) -> Self {
        let pass = enc.begin_render_pass(&RenderPassDescriptor {
            color_attachments: &[Some(RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: Operations {
                    load: if let Some(clear) = clear {
                        LoadOp::Clear(clear)
                    } else {
                        LoadOp::Load
                    },
                    ..Default::default()
                },
            })],
            ..Default::default()
        });

        Self { gpu, pass }
    }

    /// A pass that paints into `layer`, clearing it first.
    pub fn layer(gpu: &'a Gpu, enc: &'a mut CommandEncoder, layer: &Layer) -> Self {
        Self::new(gpu, enc, &layer.view, Some(Color::TRANSPARENT))
    }

    pub fn draw_stroke(&mut self, buffer: &StrokeBuffer, vertex_count: u32, erase: bool) {
        if vertex_count < 4 {
            return;
        }
        let size = u64::from(vertex_count) * mem::size_of::<Vertex>() as u64;
        let pipeline = if erase {
            &self.gpu.stroke_erase
        } else {
            &self.gpu.stroke_paint
        };
        self.pass.set_pipeline(pipeline);
        self.pass.set_bind_group(0, &self.gpu.uniforms_bg, &[]);
        self.pass.set_vertex_buffer(0, buffer.buffer.slice(..size));
        self.pass.draw(0..vertex_count, 0..1);
    }

    pub fn draw_quads(&mut self, batch: &QuadBatch, range: Range<u32>, erase: bool) {
        if range.is_empty() {
            return;
        }
        let pipeline = if erase {
            &self.gpu.quad_erase
        } else {
            &self.gpu.quad_paint
        };
        self.pass.set_pipeline(pipeline);
        self.pass.set_bind_group(0, &self.gpu.uniforms_bg, &[]);
        self.pass.set_bind_group(1, &batch.bind_group, &[]);
        self.pass.set_vertex_buffer(0, self.gpu.unit_quad.slice(..));
        self.pass.draw(0..UNIT_QUAD.len() as u32, range);
    }

    /// Blends a layer over the whole target.
    pub fn composite(&mut self, layer: &Layer) {
        self.pass.set_pipeline(&self.gpu.composite);
        self.pass.set_bind_group(0, &layer.bind_group, &[]);
        self.pass.draw(0..4, 0..1);
    }
}

/// Something the frame loop can upload and draw.
pub trait Drawable {
    /// Pushes a changed mesh to the GPU. Does nothing when it is up to date.
    fn upload(&mut self, gpu: &Gpu);

    fn draw(&self, pass: &mut Pass<'_>);
}

impl Drawable for Stroke {
    fn upload(&mut self, gpu: &Gpu) {
        if !self.needs_upload() {
            return;
        }
        let (vertices, slot) = self.buffer_for_upload();
        gpu.upload_vertices(vertices, slot);
    }

    fn draw(&self, pass: &mut Pass<'_>) {
        if let Some(buffer) = self.buffer() {
            pass.draw_stroke(buffer, self.vertices().len() as u32, self.is_eraser());
        }
    }
}
