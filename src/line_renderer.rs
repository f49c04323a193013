//! GPU renderer for line objects.
//!
//! Mirrors the host contract of an Iced shader primitive: the external
//! render loop calls [LineRenderer::prepare_frame] with the current camera
//! and objects, then [LineRenderer::encode] inside its command encoder.
//! GPU buffers and compiled shader variants are retained between frames
//! and re-synced only when version counters change.

use std::sync::Arc;

use iced::wgpu::util::DeviceExt;
use iced::{Rectangle, wgpu::*};
use indexmap::IndexMap;

use crate::camera::{Camera, CameraUniform};
use crate::line_object::LineObject;
use crate::line_style::{LineStyle, LineUniform, StyleFlags};
use crate::segment_buffer::{
    GeometryGroup, SegmentBuffer, TEMPLATE_DRAW_COUNT, TEMPLATE_INDICES, TEMPLATE_POSITIONS,
};

pub struct RenderParams<'a> {
    pub encoder: &'a mut CommandEncoder,
    pub target: &'a TextureView,
    pub bounds: Rectangle<u32>,
}

/// Compiled shader variants, one pipeline per distinct feature set.
///
/// Specialization works like the reference implementation's define table: a
/// `const` flag block is prepended to the shader source, so every branch on
/// a feature folds away at compilation. The registry is owned by the
/// renderer and passed by reference, never a process-wide table.
struct VariantRegistry {
    format: TextureFormat,
    sample_count: u32,
    bind_group_layout: BindGroupLayout,
    layout: PipelineLayout,
    pipelines: IndexMap<u32, RenderPipeline>,
}

const SHADER_SOURCE: &str = include_str!("shaders/line.wgsl");

impl VariantRegistry {
    fn new(device: &Device, format: TextureFormat, sample_count: u32) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("line_bgl"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::VERTEX_FRAGMENT,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::VERTEX_FRAGMENT,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 2,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: true },
                        view_dimension: TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 3,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("line layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        Self {
            format,
            sample_count,
            bind_group_layout,
            layout,
            pipelines: IndexMap::new(),
        }
    }

    fn variant_source(flags: StyleFlags) -> String {
        let defines = [
            ("USE_WORLD_UNITS", StyleFlags::WORLD_UNITS),
            ("USE_VARY_WIDTH", StyleFlags::VARY_WIDTH),
            ("USE_DASH", StyleFlags::DASHED),
            ("USE_REMAP", StyleFlags::ENDPOINT_REMAP),
            ("USE_TEXTURE", StyleFlags::TEXTURED),
            ("USE_VERTEX_COLORS", StyleFlags::VERTEX_COLORS),
            ("USE_COVERAGE_AA", StyleFlags::COVERAGE_AA),
        ];
        let mut source = String::new();
        for (name, flag) in defines {
            source.push_str(&format!("const {name}: bool = {};\n", flags.contains(flag)));
        }
        source.push_str(SHADER_SOURCE);
        source
    }

    fn ensure(&mut self, device: &Device, flags: StyleFlags) {
        let key = flags.bits();
        if self.pipelines.contains_key(&key) {
            return;
        }
        log::debug!("compiling line shader variant {key:#b}");

        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("line shader"),
            source: ShaderSource::Wgsl(Self::variant_source(flags).into()),
        });
        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("line pipeline"),
            layout: Some(&self.layout),
            vertex: VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: PipelineCompilationOptions::default(),
                buffers: &[
                    // Shared 6-vertex template.
                    VertexBufferLayout {
                        array_stride: 12,
                        step_mode: VertexStepMode::Vertex,
                        attributes: &[VertexAttribute {
                            offset: 0,
                            shader_location: 0,
                            format: VertexFormat::Float32x3,
                        }],
                    },
                    // Instance positions: interleaved start + end.
                    VertexBufferLayout {
                        array_stride: 24,
                        step_mode: VertexStepMode::Instance,
                        attributes: &[
                            VertexAttribute {
                                offset: 0,
                                shader_location: 1,
                                format: VertexFormat::Float32x3,
                            },
                            VertexAttribute {
                                offset: 12,
                                shader_location: 2,
                                format: VertexFormat::Float32x3,
                            },
                        ],
                    },
                    // Instance colors: interleaved start + end.
                    VertexBufferLayout {
                        array_stride: 24,
                        step_mode: VertexStepMode::Instance,
                        attributes: &[
                            VertexAttribute {
                                offset: 0,
                                shader_location: 3,
                                format: VertexFormat::Float32x3,
                            },
                            VertexAttribute {
                                offset: 12,
                                shader_location: 4,
                                format: VertexFormat::Float32x3,
                            },
                        ],
                    },
                    // Instance width scales: start + end.
                    VertexBufferLayout {
                        array_stride: 8,
                        step_mode: VertexStepMode::Instance,
                        attributes: &[
                            VertexAttribute {
                                offset: 0,
                                shader_location: 5,
                                format: VertexFormat::Float32,
                            },
                            VertexAttribute {
                                offset: 4,
                                shader_location: 6,
                                format: VertexFormat::Float32,
                            },
                        ],
                    },
                    // Instance dash distances: start + end.
                    VertexBufferLayout {
                        array_stride: 8,
                        step_mode: VertexStepMode::Instance,
                        attributes: &[
                            VertexAttribute {
                                offset: 0,
                                shader_location: 7,
                                format: VertexFormat::Float32,
                            },
                            VertexAttribute {
                                offset: 4,
                                shader_location: 8,
                                format: VertexFormat::Float32,
                            },
                        ],
                    },
                ],
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: PipelineCompilationOptions::default(),
                targets: &[Some(ColorTargetState {
                    format: self.format,
                    blend: Some(BlendState::ALPHA_BLENDING),
                    write_mask: ColorWrites::ALL,
                })],
            }),
            primitive: PrimitiveState {
                topology: PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: MultisampleState {
                count: self.sample_count,
                mask: !0,
                alpha_to_coverage_enabled: flags.contains(StyleFlags::COVERAGE_AA),
            },
            multiview: None,
            cache: None,
        });
        self.pipelines.insert(key, pipeline);
    }

    fn get(&self, key: u32) -> Option<&RenderPipeline> {
        self.pipelines.get(&key)
    }
}

struct StreamBuffer {
    buffer: Buffer,
    capacity: u64,
}

/// GPU copies of one segment buffer's instance streams, shared by every
/// object that references the buffer.
struct GpuStreams {
    instance_count: u32,
    positions: Option<StreamBuffer>,
    colors: Option<StreamBuffer>,
    widths: Option<StreamBuffer>,
    distances: Option<StreamBuffer>,
    // Stand-ins for absent optional streams: all-ones covers colors and
    // width scales, all-zeros covers distances.
    neutral_ones: Option<StreamBuffer>,
    neutral_zeros: Option<StreamBuffer>,
    positions_version: u64,
    colors_version: u64,
    widths_version: u64,
    distances_version: u64,
}

impl GpuStreams {
    fn new() -> Self {
        Self {
            instance_count: 0,
            positions: None,
            colors: None,
            widths: None,
            distances: None,
            neutral_ones: None,
            neutral_zeros: None,
            positions_version: u64::MAX,
            colors_version: u64::MAX,
            widths_version: u64::MAX,
            distances_version: u64::MAX,
        }
    }
}

/// Per-(object, style) uniform buffer and bind group.
struct StyleEntry {
    uniform: Buffer,
    bind_group: BindGroup,
    texture_key: usize,
}

#[derive(Clone)]
struct DrawCommand {
    render_order: i32,
    flags_bits: u32,
    buffer_key: usize,
    object_key: u64,
    style_index: usize,
    instances: std::ops::Range<u32>,
}

pub struct LineRenderer {
    sample_count: u32,
    registry: VariantRegistry,
    camera_buffer: Buffer,
    template_vertices: Buffer,
    template_indices: Buffer,
    fallback_alpha: TextureView,
    sampler: Sampler,
    streams: IndexMap<usize, GpuStreams>,
    styles: IndexMap<(u64, usize), StyleEntry>,
    draws: Vec<DrawCommand>,
    degradations_warned: std::collections::HashSet<(u64, usize, u32)>,
}

impl LineRenderer {
    pub fn new(device: &Device, queue: &Queue, format: TextureFormat, sample_count: u32) -> Self {
        let registry = VariantRegistry::new(device, format, sample_count);

        let camera_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("line camera buffer"),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let template_vertices = device.create_buffer_init(&util::BufferInitDescriptor {
            label: Some("line template vb"),
            contents: bytemuck::cast_slice(&TEMPLATE_POSITIONS),
            usage: BufferUsages::VERTEX,
        });
        let template_indices = device.create_buffer_init(&util::BufferInitDescriptor {
            label: Some("line template ib"),
            contents: bytemuck::cast_slice(&TEMPLATE_INDICES),
            usage: BufferUsages::INDEX,
        });

        // 1x1 opaque mask bound while a textured style has no alpha map.
        let fallback = device.create_texture(&TextureDescriptor {
            label: Some("line fallback alpha"),
            size: Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::R8Unorm,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            TexelCopyTextureInfo {
                texture: &fallback,
                mip_level: 0,
                origin: Origin3d::ZERO,
                aspect: TextureAspect::All,
            },
            &[255u8],
            TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: None,
                rows_per_image: None,
            },
            Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        let fallback_alpha = fallback.create_view(&TextureViewDescriptor::default());

        let sampler = device.create_sampler(&SamplerDescriptor {
            label: Some("line alpha sampler"),
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            ..SamplerDescriptor::default()
        });

        Self {
            sample_count,
            registry,
            camera_buffer,
            template_vertices,
            template_indices,
            fallback_alpha,
            sampler,
            streams: IndexMap::new(),
            styles: IndexMap::new(),
            draws: Vec::new(),
            degradations_warned: std::collections::HashSet::new(),
        }
    }

    /// Sync GPU state for this frame: camera uniform, per-buffer instance
    /// streams (by version), per-style uniforms/bind groups, and the
    /// ordered draw list. Everything a later [Self::encode] call reads is
    /// settled here, so mutations between the two calls do not tear.
    pub fn prepare_frame(
        &mut self,
        device: &Device,
        queue: &Queue,
        camera: &Camera,
        objects: &[&LineObject],
    ) {
        let mut cam = CameraUniform::default();
        cam.update(camera);
        queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&cam));

        self.draws.clear();
        for object in objects {
            let buffer_key = object.buffer().buffer_key();
            {
                let buffer = object.buffer().read();
                self.sync_streams(device, queue, buffer_key, &buffer);
            }
            let buffer = object.buffer().read();
            if buffer.instance_count() == 0 {
                continue;
            }

            // No explicit groups: the whole buffer drawn with style 0.
            let groups: Vec<GeometryGroup> = if buffer.groups().is_empty() {
                vec![GeometryGroup {
                    start: 0,
                    count: None,
                    style_index: 0,
                }]
            } else {
                buffer.groups().to_vec()
            };

            for group in groups {
                let instances = buffer.group_range(&group);
                if instances.is_empty() {
                    continue;
                }
                let Some(style) = object.styles.get(group.style_index as usize) else {
                    log::warn!(
                        "{}: group references style {} but the object has {}",
                        object.id,
                        group.style_index,
                        object.styles.len()
                    );
                    continue;
                };

                let flags = style.effective_flags(self.sample_count);
                self.warn_degradations(object.id.0, group.style_index as usize, style, flags);
                self.report_missing_streams(flags, &buffer);
                self.registry.ensure(device, flags);
                self.ensure_style_entry(device, queue, object.id.0, group.style_index as usize, style);

                self.draws.push(DrawCommand {
                    render_order: object.render_order,
                    flags_bits: flags.bits(),
                    buffer_key,
                    object_key: object.id.0,
                    style_index: group.style_index as usize,
                    instances,
                });
            }
        }

        // Back-to-front by the objects' render order; stable, so equal
        // orders keep submission order.
        self.draws.sort_by_key(|d| d.render_order);

        self.prune_caches(objects);
    }

    /// Record the prepared draws into the host's command encoder. Blend
    /// and depth configuration beyond straight alpha blending belong to
    /// the host's pass setup.
    pub fn encode(&self, params: RenderParams) {
        let x = params.bounds.x as f32;
        let y = params.bounds.y as f32;
        let width = params.bounds.width as f32;
        let height = params.bounds.height as f32;

        let mut pass = params.encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("iced_polyline main"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view: params.target,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Load,
                    store: StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        pass.set_viewport(x, y, width, height, 0.0, 1.0);
        pass.set_scissor_rect(
            params.bounds.x,
            params.bounds.y,
            params.bounds.width,
            params.bounds.height,
        );

        for draw in &self.draws {
            let Some(pipeline) = self.registry.get(draw.flags_bits) else {
                continue;
            };
            let Some(streams) = self.streams.get(&draw.buffer_key) else {
                continue;
            };
            let Some(entry) = self.styles.get(&(draw.object_key, draw.style_index)) else {
                continue;
            };
            let (Some(positions), Some(ones), Some(zeros)) = (
                streams.positions.as_ref(),
                streams.neutral_ones.as_ref(),
                streams.neutral_zeros.as_ref(),
            ) else {
                continue;
            };

            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &entry.bind_group, &[]);
            pass.set_vertex_buffer(0, self.template_vertices.slice(..));
            pass.set_vertex_buffer(1, positions.buffer.slice(..));
            pass.set_vertex_buffer(
                2,
                streams
                    .colors
                    .as_ref()
                    .unwrap_or(ones)
                    .buffer
                    .slice(..),
            );
            pass.set_vertex_buffer(
                3,
                streams
                    .widths
                    .as_ref()
                    .unwrap_or(ones)
                    .buffer
                    .slice(..),
            );
            pass.set_vertex_buffer(
                4,
                streams
                    .distances
                    .as_ref()
                    .unwrap_or(zeros)
                    .buffer
                    .slice(..),
            );
            pass.set_index_buffer(self.template_indices.slice(..), IndexFormat::Uint32);
            pass.draw_indexed(0..TEMPLATE_DRAW_COUNT, 0, draw.instances.clone());
        }
    }

    fn sync_streams(
        &mut self,
        device: &Device,
        queue: &Queue,
        buffer_key: usize,
        buffer: &SegmentBuffer,
    ) {
        let entry = self
            .streams
            .entry(buffer_key)
            .or_insert_with(GpuStreams::new);
        let count = buffer.instance_count();

        if entry.positions_version != buffer.positions_version() {
            upload_stream(
                device,
                queue,
                &mut entry.positions,
                buffer.positions(),
                "line position vb",
            );
            entry.positions_version = buffer.positions_version();
        }
        if let Some(colors) = buffer.colors() {
            if entry.colors_version != buffer.colors_version() {
                upload_stream(device, queue, &mut entry.colors, colors, "line color vb");
                entry.colors_version = buffer.colors_version();
            }
        } else {
            entry.colors = None;
        }
        if let Some(widths) = buffer.widths() {
            if entry.widths_version != buffer.widths_version() {
                upload_stream(device, queue, &mut entry.widths, widths, "line width vb");
                entry.widths_version = buffer.widths_version();
            }
        } else {
            entry.widths = None;
        }
        if let Some(distances) = buffer.distances() {
            if entry.distances_version != buffer.distances_version() {
                upload_stream(
                    device,
                    queue,
                    &mut entry.distances,
                    distances,
                    "line distance vb",
                );
                entry.distances_version = buffer.distances_version();
            }
        } else {
            entry.distances = None;
        }

        // Neutral stand-ins must cover the largest stride (colors, 6
        // floats per instance).
        if entry.instance_count < count as u32 || entry.neutral_ones.is_none() {
            let ones = vec![1.0f32; count * 6];
            let zeros = vec![0.0f32; count * 6];
            upload_stream(device, queue, &mut entry.neutral_ones, &ones, "line ones vb");
            upload_stream(device, queue, &mut entry.neutral_zeros, &zeros, "line zeros vb");
        }
        entry.instance_count = count as u32;
    }

    fn ensure_style_entry(
        &mut self,
        device: &Device,
        queue: &Queue,
        object_key: u64,
        style_index: usize,
        style: &LineStyle,
    ) {
        let texture_key = style
            .alpha_map
            .as_ref()
            .map(|t| Arc::as_ptr(t) as usize)
            .unwrap_or(0);

        let rebuild = match self.styles.get(&(object_key, style_index)) {
            Some(entry) => entry.texture_key != texture_key,
            None => true,
        };

        if rebuild {
            let uniform = device.create_buffer(&BufferDescriptor {
                label: Some("line style uniform"),
                size: std::mem::size_of::<LineUniform>() as u64,
                usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let texture_view: &TextureView = style
                .alpha_map
                .as_deref()
                .unwrap_or(&self.fallback_alpha);
            let bind_group = device.create_bind_group(&BindGroupDescriptor {
                label: Some("line style bg"),
                layout: &self.registry.bind_group_layout,
                entries: &[
                    BindGroupEntry {
                        binding: 0,
                        resource: self.camera_buffer.as_entire_binding(),
                    },
                    BindGroupEntry {
                        binding: 1,
                        resource: uniform.as_entire_binding(),
                    },
                    BindGroupEntry {
                        binding: 2,
                        resource: BindingResource::TextureView(texture_view),
                    },
                    BindGroupEntry {
                        binding: 3,
                        resource: BindingResource::Sampler(&self.sampler),
                    },
                ],
            });
            self.styles.insert(
                (object_key, style_index),
                StyleEntry {
                    uniform,
                    bind_group,
                    texture_key,
                },
            );
        }

        // Numeric parameters are cheap; rewrite them every frame.
        if let Some(entry) = self.styles.get(&(object_key, style_index)) {
            let uniform = LineUniform::from_style(style);
            queue.write_buffer(&entry.uniform, 0, bytemuck::bytes_of(&uniform));
        }
    }

    // Unusable flag combinations degrade instead of failing; the caller
    // error is surfaced once per style, not once per frame.
    fn warn_degradations(
        &mut self,
        object_key: u64,
        style_index: usize,
        style: &LineStyle,
        effective: StyleFlags,
    ) {
        let requested = style.flags();
        let lost = requested.bits() & !effective.bits();
        if lost == 0 || !self.degradations_warned.insert((object_key, style_index, lost)) {
            return;
        }
        if requested.contains(StyleFlags::DASHED) && !effective.contains(StyleFlags::DASHED) {
            log::warn!(
                "style {style_index} of object {object_key}: dash_size + gap_size \
                 must be positive (got {}); rendering solid",
                style.dash_period()
            );
        }
        if requested.contains(StyleFlags::COVERAGE_AA)
            && !effective.contains(StyleFlags::COVERAGE_AA)
        {
            log::warn!(
                "style {style_index} of object {object_key}: coverage antialiasing \
                 needs a multisampled target; falling back to hard discard"
            );
        }
    }

    // Surface missing-stream combinations as diagnostics; rendering
    // degrades to the neutral stand-ins instead of failing.
    fn report_missing_streams(&self, flags: StyleFlags, buffer: &SegmentBuffer) {
        if flags.contains(StyleFlags::VARY_WIDTH) && buffer.widths().is_none() {
            log::debug!("style varies width but the buffer has no width stream");
        }
        if flags.contains(StyleFlags::VERTEX_COLORS) && buffer.colors().is_none() {
            log::debug!("style uses vertex colors but the buffer has no color stream");
        }
        if flags.contains(StyleFlags::DASHED) && buffer.distances().is_none() {
            log::debug!("style dashes but the buffer has no distance stream");
        }
    }

    // Drop cache entries for buffers and objects no longer drawn.
    fn prune_caches(&mut self, objects: &[&LineObject]) {
        let buffer_keys: Vec<usize> = objects.iter().map(|o| o.buffer().buffer_key()).collect();
        self.streams.retain(|key, _| buffer_keys.contains(key));

        let object_keys: Vec<u64> = objects.iter().map(|o| o.id.0).collect();
        self.styles
            .retain(|(object_key, _), _| object_keys.contains(object_key));
        self.degradations_warned
            .retain(|(object_key, _, _)| object_keys.contains(object_key));
    }
}

fn upload_stream(
    device: &Device,
    queue: &Queue,
    slot: &mut Option<StreamBuffer>,
    data: &[f32],
    label: &str,
) {
    let needed = std::mem::size_of_val(data) as u64;
    let recreate = match slot {
        Some(sb) => sb.capacity < needed,
        None => true,
    };
    if recreate {
        let capacity = needed.max(1024);
        *slot = Some(StreamBuffer {
            buffer: device.create_buffer(&BufferDescriptor {
                label: Some(label),
                size: capacity,
                usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            capacity,
        });
    }
    if let Some(sb) = slot {
        queue.write_buffer(&sb.buffer, 0, bytemuck::cast_slice(data));
    }
}
