use std::collections::HashMap;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat3;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::camera::PerspectiveCamera;
use crate::color::Color;
use crate::config::{INITIAL_INSTANCE_CAPACITY, LOGGING_ENABLED, MAX_POINT_LIGHTS};
use crate::error::RenderError;
use crate::lights::{LightKind, PlacedLight};
use crate::mesh::{MeshData, MeshId};
use crate::renderer::{Renderer, ShadowFilter};
use crate::scene::{MeshInstance, SceneGraph};
use crate::viewport::ViewportState;

// ======================================
// === SHADER DATA STRUCTURES ===
// ======================================

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct Vertex {
    position: [f32; 3],
    normal: [f32; 3],
}

impl Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

// Per-draw data, one entry per mesh instance.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct InstanceData {
    model_matrix: [[f32; 4]; 4],
    normal_matrix: [[f32; 4]; 3],
    color: [f32; 4],
}

impl InstanceData {
    const ATTRIBUTES: [wgpu::VertexAttribute; 8] = wgpu::vertex_attr_array![
        2 => Float32x4, 3 => Float32x4, 4 => Float32x4, 5 => Float32x4,
        6 => Float32x4, 7 => Float32x4, 8 => Float32x4,
        9 => Float32x4,
    ];

    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<InstanceData>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBUTES,
        }
    }

    fn new(instance: &MeshInstance) -> Self {
        let normal = Mat3::from_mat4(instance.world);
        let normal = if normal.determinant().abs() > f32::EPSILON {
            normal.inverse().transpose()
        } else {
            Mat3::IDENTITY
        };

        Self {
            model_matrix: instance.world.to_cols_array_2d(),
            normal_matrix: [
                normal.x_axis.extend(0.0).to_array(),
                normal.y_axis.extend(0.0).to_array(),
                normal.z_axis.extend(0.0).to_array(),
            ],
            color: instance.mesh.base_color,
        }
    }
}

// Every member is a vec4 or mat4 so the layout matches WGSL without padding.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct SceneUniforms {
    view_proj: [[f32; 4]; 4],
    camera_position: [f32; 4],
    ambient: [f32; 4],
    // xyz toward the light, w > 0 when present
    sun_direction: [f32; 4],
    sun_color: [f32; 4],
    fog_color: [f32; 4],
    // near, far, enabled, point light count
    fog_range: [f32; 4],
    // xyz position, w cutoff distance
    point_positions: [[f32; 4]; MAX_POINT_LIGHTS],
    // rgb radiance, w decay
    point_colors: [[f32; 4]; MAX_POINT_LIGHTS],
}

impl SceneUniforms {
    fn new(scene: &SceneGraph, camera: &PerspectiveCamera) -> Self {
        let mut uniforms = Self::zeroed();
        uniforms.view_proj = camera.view_projection().to_cols_array_2d();
        uniforms.camera_position = camera.position.extend(1.0).to_array();

        let lights = scene.lights();
        uniforms.ambient = padded(
            lights
                .iter()
                .filter(|l| l.light.kind == LightKind::Ambient)
                .fold(Color::BLACK, |acc, l| {
                    let r = l.light.radiance();
                    Color::rgb(acc.r + r.r, acc.g + r.g, acc.b + r.b)
                }),
        );

        if let Some((sun, direction)) = lights
            .iter()
            .find_map(|l| l.direction_to_light().map(|d| (l, d)))
        {
            uniforms.sun_direction = direction.extend(1.0).to_array();
            uniforms.sun_color = padded(sun.light.radiance());
        }

        let points: Vec<&PlacedLight> = lights
            .iter()
            .filter(|l| matches!(l.light.kind, LightKind::Point { .. }))
            .collect();
        if points.len() > MAX_POINT_LIGHTS {
            log::debug!("{} point lights, only {} shaded", points.len(), MAX_POINT_LIGHTS);
        }
        let mut count = 0;
        for (slot, placed) in points.iter().take(MAX_POINT_LIGHTS).enumerate() {
            if let LightKind::Point { distance, decay } = placed.light.kind {
                uniforms.point_positions[slot] = placed.position.extend(distance).to_array();
                let radiance = placed.light.radiance();
                uniforms.point_colors[slot] = [radiance.r, radiance.g, radiance.b, decay];
                count += 1;
            }
        }

        if let Some(fog) = scene.fog() {
            uniforms.fog_color = padded(fog.color);
            uniforms.fog_range = [fog.near, fog.far, 1.0, count as f32];
        } else {
            uniforms.fog_range = [0.0, 0.0, 0.0, count as f32];
        }
        uniforms
    }
}

fn padded(color: Color) -> [f32; 4] {
    [color.r, color.g, color.b, 1.0]
}

// ============================
// === SHADER SOURCES ===
// ============================

fn generate_render_shader(max_point_lights: usize) -> String {
    format!(
        r#"
    struct Uniforms {{
        view_proj: mat4x4<f32>,
        camera_position: vec4<f32>,
        ambient: vec4<f32>,
        sun_direction: vec4<f32>,
        sun_color: vec4<f32>,
        fog_color: vec4<f32>,
        fog_range: vec4<f32>,
        point_positions: array<vec4<f32>, {max_point_lights}>,
        point_colors: array<vec4<f32>, {max_point_lights}>,
    }};

    @group(0) @binding(0)
    var<uniform> uniforms: Uniforms;

    struct VertexInput {{
        @location(0) position: vec3<f32>,
        @location(1) normal: vec3<f32>,
    }};

    struct InstanceInput {{
        @location(2) model_0: vec4<f32>,
        @location(3) model_1: vec4<f32>,
        @location(4) model_2: vec4<f32>,
        @location(5) model_3: vec4<f32>,
        @location(6) normal_0: vec4<f32>,
        @location(7) normal_1: vec4<f32>,
        @location(8) normal_2: vec4<f32>,
        @location(9) color: vec4<f32>,
    }};

    struct VertexOutput {{
        @builtin(position) clip_position: vec4<f32>,
        @location(0) world_position: vec3<f32>,
        @location(1) normal: vec3<f32>,
        @location(2) color: vec4<f32>,
    }};

    @vertex
    fn vs_main(vertex: VertexInput, instance: InstanceInput) -> VertexOutput {{
        let model = mat4x4<f32>(instance.model_0, instance.model_1, instance.model_2, instance.model_3);
        let normal_matrix = mat3x3<f32>(instance.normal_0.xyz, instance.normal_1.xyz, instance.normal_2.xyz);
        let world = model * vec4<f32>(vertex.position, 1.0);

        var out: VertexOutput;
        out.clip_position = uniforms.view_proj * world;
        out.world_position = world.xyz;
        out.normal = normal_matrix * vertex.normal;
        out.color = instance.color;
        return out;
    }}

    // Inverse power falloff windowed to zero at the cutoff distance.
    fn point_falloff(dist: f32, cutoff: f32, decay: f32) -> f32 {{
        var falloff = 1.0 / pow(max(dist, 0.01), decay);
        if (cutoff > 0.0) {{
            let ratio = dist / cutoff;
            let window = clamp(1.0 - ratio * ratio * ratio * ratio, 0.0, 1.0);
            falloff = falloff * window * window;
        }}
        return falloff;
    }}

    @fragment
    fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {{
        let n = normalize(in.normal);
        var light = uniforms.ambient.rgb;

        if (uniforms.sun_direction.w > 0.0) {{
            let sun = normalize(uniforms.sun_direction.xyz);
            light += uniforms.sun_color.rgb * max(dot(n, sun), 0.0);
        }}

        let point_count = u32(uniforms.fog_range.w);
        for (var i = 0u; i < point_count; i = i + 1u) {{
            let to_light = uniforms.point_positions[i].xyz - in.world_position;
            let dist = length(to_light);
            let l = to_light / max(dist, 0.0001);
            let falloff = point_falloff(dist, uniforms.point_positions[i].w, uniforms.point_colors[i].w);
            light += uniforms.point_colors[i].rgb * max(dot(n, l), 0.0) * falloff;
        }}

        var color = in.color.rgb * light;
        if (uniforms.fog_range.z > 0.0) {{
            let depth = distance(uniforms.camera_position.xyz, in.world_position);
            let fog = smoothstep(uniforms.fog_range.x, uniforms.fog_range.y, depth);
            color = mix(color, uniforms.fog_color.rgb, fog);
        }}
        return vec4<f32>(color, in.color.a);
    }}
    "#
    )
}

// ======================================
// === RENDERER ===
// ======================================

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

impl GpuMesh {
    fn upload(device: &wgpu::Device, mesh: &MeshData) -> Self {
        let vertices: Vec<Vertex> = mesh
            .positions
            .iter()
            .zip(&mesh.normals)
            .map(|(&position, &normal)| Vertex { position, normal })
            .collect();

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Index Buffer"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count() as u32,
        }
    }
}

/// Forward renderer for the scene graph: one instanced draw per mesh with
/// ambient, sun and point lighting plus linear-range fog.
pub struct WgpuRenderer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth_view: wgpu::TextureView,
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    instance_buffer: wgpu::Buffer,
    instance_capacity: usize,
    meshes: HashMap<MeshId, GpuMesh>,
    clear_color: wgpu::Color,
}

impl WgpuRenderer {
    pub async fn new(window: Arc<Window>, width: u32, height: u32, pixel_ratio: f64) -> Result<Self, RenderError> {
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "wasm32")] {
                let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                    backends: wgpu::Backends::BROWSER_WEBGPU,
                    ..Default::default()
                });
                let limits = wgpu::Limits::downlevel_webgl2_defaults();
            } else {
                let instance = wgpu::Instance::default();
                let limits = wgpu::Limits::default();
            }
        }

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            })
            .await?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await?;

        let caps = surface.get_capabilities(&adapter);
        let surface_format = *caps.formats.first().ok_or(RenderError::NoSurfaceFormat)?;

        let (buffer_width, buffer_height) = buffer_size(&device, width, height, pixel_ratio);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: buffer_width,
            height: buffer_height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![surface_format.add_srgb_suffix()],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_view = Self::create_depth_view(&device, &config);

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Scene Uniform Buffer"),
            size: std::mem::size_of::<SceneUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(generate_render_shader(MAX_POINT_LIGHTS).into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Scene Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::desc(), InstanceData::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format.add_srgb_suffix(),
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // glTF materials are frequently double sided
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: wgpu::TextureFormat::Depth24Plus,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });

        let instance_buffer = Self::create_instance_buffer(&device, INITIAL_INSTANCE_CAPACITY);

        log::info!(
            "Renderer ready: {:?}, {}x{} surface",
            surface_format,
            config.width,
            config.height
        );

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            depth_view,
            pipeline,
            uniform_buffer,
            bind_group,
            instance_buffer,
            instance_capacity: INITIAL_INSTANCE_CAPACITY,
            meshes: HashMap::new(),
            clear_color: wgpu::Color::BLACK,
        })
    }

    fn create_depth_view(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) -> wgpu::TextureView {
        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size: wgpu::Extent3d {
                width: config.width,
                height: config.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth24Plus,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        depth_texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    fn create_instance_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Instance Buffer"),
            size: (std::mem::size_of::<InstanceData>() * capacity) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn prepare_instances(&mut self, instances: &[MeshInstance]) {
        for instance in instances {
            self.meshes
                .entry(instance.mesh.id())
                .or_insert_with(|| GpuMesh::upload(&self.device, &instance.mesh));
        }

        if instances.len() > self.instance_capacity {
            let capacity = instances.len().next_power_of_two();
            if LOGGING_ENABLED {
                log::debug!("Instance buffer grown to {}", capacity);
            }
            self.instance_buffer = Self::create_instance_buffer(&self.device, capacity);
            self.instance_capacity = capacity;
        }

        let data: Vec<InstanceData> = instances.iter().map(InstanceData::new).collect();
        if !data.is_empty() {
            self.queue
                .write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(&data));
        }
    }
}

fn buffer_size(device: &wgpu::Device, width: u32, height: u32, pixel_ratio: f64) -> (u32, u32) {
    let max = device.limits().max_texture_dimension_2d;
    let (w, h) = ViewportState::new(width, height, pixel_ratio).buffer_size();
    (w.clamp(1, max), h.clamp(1, max))
}

impl Renderer for WgpuRenderer {
    fn resize(&mut self, width: u32, height: u32, pixel_ratio: f64) {
        if width == 0 || height == 0 {
            return;
        }

        let (buffer_width, buffer_height) = buffer_size(&self.device, width, height, pixel_ratio);
        if (buffer_width, buffer_height) == (self.config.width, self.config.height) {
            return;
        }

        self.config.width = buffer_width;
        self.config.height = buffer_height;
        self.surface.configure(&self.device, &self.config);
        self.depth_view = Self::create_depth_view(&self.device, &self.config);
    }

    fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color.to_wgpu();
    }

    // No shadow-map pass is drawn; the request is only logged.
    fn configure_shadows(&mut self, enabled: bool, filter: ShadowFilter) {
        log::info!("Shadows {} ({:?})", if enabled { "on" } else { "off" }, filter);
    }

    fn render(&mut self, scene: &SceneGraph, camera: &PerspectiveCamera) -> Result<(), RenderError> {
        let instances = scene.meshes();
        self.prepare_instances(&instances);

        let uniforms = SceneUniforms::new(scene, camera);
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Err(RenderError::SurfaceLost);
            }
            Err(err) => return Err(err.into()),
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor {
            format: Some(self.config.format.add_srgb_suffix()),
            ..Default::default()
        });

        let mut encoder = self.device.create_command_encoder(&Default::default());
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &self.bind_group, &[]);
            render_pass.set_vertex_buffer(1, self.instance_buffer.slice(..));

            for (index, instance) in instances.iter().enumerate() {
                let Some(mesh) = self.meshes.get(&instance.mesh.id()) else {
                    continue;
                };
                if mesh.index_count == 0 {
                    continue;
                }
                let index = index as u32;
                render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                render_pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..mesh.index_count, 0, index..index + 1);
            }
        }

        self.queue.submit([encoder.finish()]);
        self.window.pre_present_notify();
        output.present();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lights::{Fog, LightRig};

    #[test]
    fn gpu_structs_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 24);
        assert_eq!(std::mem::size_of::<InstanceData>(), 128);
        assert_eq!(std::mem::size_of::<SceneUniforms>() % 16, 0);
    }

    #[test]
    fn uniforms_pack_the_light_rig() {
        let mut scene = SceneGraph::new();
        LightRig::install(&mut scene).unwrap();
        scene.set_fog(Some(Fog::atmosphere().unwrap()));
        let camera = PerspectiveCamera::scene_default();

        let uniforms = SceneUniforms::new(&scene, &camera);
        assert_eq!(uniforms.sun_direction, [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(uniforms.fog_range, [1.0, 15.0, 1.0, 1.0]);
        assert_eq!(uniforms.point_positions[0], [0.0, 2.2, 2.7, 7.0]);
        assert_eq!(uniforms.point_colors[0][3], 2.0);
        assert_eq!(uniforms.point_positions[1], [0.0; 4]);
    }

    #[test]
    fn shader_source_sizes_light_arrays() {
        let source = generate_render_shader(4);
        assert!(source.contains("array<vec4<f32>, 4>"));
        assert!(source.contains("fn fs_main"));
    }
}
