//! GPU escape-time evaluation using glow (OpenGL).
//!
//! Both stages run inside a single [`egui::PaintCallback`]:
//!
//! 1. **evaluate**: only when a presented request is waiting, the escape-time
//!    shader renders into the back texture, sized to the viewport in physical
//!    pixels; on success back and front swap;
//! 2. **present**: a fullscreen quad samples the front texture into the canvas rect.
//!
//! A static view therefore costs one texture blit per egui frame and no
//! iteration work. A failed pass never touches the front texture, so the last
//! good image stays on screen, also across a resize.

use std::sync::{Arc, Mutex};

use glow::HasContext as _;

use crate::config::field::FieldConfig;
use crate::core::geometry::ViewportSize;
use crate::rendering::{FieldEvaluator, FieldParams, RenderError};

// ─── Shader sources ─────────────────────────────────────────────────────

const VERT_SRC: &str = r#"#version 140

in vec2 a_pos;
out vec2 v_uv;

void main() {
    // Texture row 0 is the bottom of the offscreen target, same as NDC.
    v_uv = a_pos * 0.5 + 0.5;
    gl_Position = vec4(a_pos, 0.0, 1.0);
}
"#;

const EVAL_FRAG_SRC: &str = r#"#version 140

out vec4 frag_color;

uniform vec2 u_resolution;        // offscreen target in physical pixels
uniform float u_scale;
uniform vec2 u_offset;
uniform float u_max_iterations;
uniform float u_squared_radius;
uniform float u_min_intensity;
uniform float u_gamma;

void main() {
    // Shorter side spans [-1, 1]; gl_FragCoord.y already grows upward.
    vec2 c = (2.0 * gl_FragCoord.xy - u_resolution) / min(u_resolution.x, u_resolution.y);
    c = u_scale * c + u_offset;

    vec2 z = vec2(0.0);
    float i = 0.0;
    for (; i < u_max_iterations; i += 1.0) {
        if (dot(z, z) > u_squared_radius) {
            break;
        }
        z = vec2(z.x * z.x - z.y * z.y + c.x, 2.0 * z.x * z.y + c.y);
    }

    float alpha = u_min_intensity * pow(i / u_max_iterations, u_gamma);
    frag_color = vec4(vec3(1.0 - alpha), 1.0);
}
"#;

const PRESENT_FRAG_SRC: &str = r#"#version 140

in vec2 v_uv;
out vec4 frag_color;

uniform sampler2D u_field_tex;

void main() {
    frag_color = vec4(texture(u_field_tex, v_uv).rgb, 1.0);
}
"#;

// ─── GL resource bundle ─────────────────────────────────────────────────

struct GlResources {
    eval_program: glow::Program,
    present_program: glow::Program,
    vao: glow::VertexArray,
    vbo: glow::Buffer,
    fbo: glow::Framebuffer,
    /// Front / back field textures, indexed by [`FrameSlots`].
    field_tex: [glow::Texture; 2],
    /// Size each texture's storage is currently allocated at.
    tex_size: [ViewportSize; 2],
    loc_resolution: Option<glow::UniformLocation>,
    loc_scale: Option<glow::UniformLocation>,
    loc_offset: Option<glow::UniformLocation>,
    loc_max_iterations: Option<glow::UniformLocation>,
    loc_squared_radius: Option<glow::UniformLocation>,
    loc_min_intensity: Option<glow::UniformLocation>,
    loc_gamma: Option<glow::UniformLocation>,
    loc_field_tex: Option<glow::UniformLocation>,
}

// ─── Double-buffer bookkeeping ──────────────────────────────────────────

/// Which of the two field textures is on screen.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct FrameSlots {
    front: usize,
    has_image: bool,
    /// GPU passes executed, successful or not.
    evaluations: u64,
    /// Successful passes swapped to the front.
    presented: u64,
}

impl FrameSlots {
    fn back(&self) -> usize {
        1 - self.front
    }

    /// Bookkeeping after one pass into the back texture.
    fn finish(&mut self, result: &Result<(), RenderError>) {
        self.evaluations += 1;
        match result {
            Ok(()) => {
                self.front = self.back();
                self.has_image = true;
                self.presented += 1;
            }
            Err(e) => log::warn!("GPU 求值失败，保留上一帧: {e}"),
        }
    }
}

// ─── Public shared state ────────────────────────────────────────────────

/// Shared state for the GPU field evaluator.
///
/// Wrap in `Arc<Mutex<GlFieldState>>`: the frame tick queues evaluations
/// through [`FieldEvaluator`], the [`egui::PaintCallback`] executes them.
pub struct GlFieldState {
    resources: Option<GlResources>,
    /// Resource creation failed; never retried.
    broken: bool,
    field: FieldConfig,
    /// Accepted by `evaluate`, waiting for `present`; a newer request replaces it.
    queued: Option<FieldParams>,
    /// Presented and waiting for the next paint callback.
    pending: Option<FieldParams>,
    slots: FrameSlots,
}

impl GlFieldState {
    pub fn new(field: FieldConfig) -> Self {
        Self {
            resources: None,
            broken: false,
            field,
            queued: None,
            pending: None,
            slots: FrameSlots::default(),
        }
    }

    /// Evaluations actually executed on the GPU.
    pub fn evaluations(&self) -> u64 {
        self.slots.evaluations
    }

    /// Evaluations that succeeded and reached the screen.
    pub fn presented(&self) -> u64 {
        self.slots.presented
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Release GL resources.  Must be called with a current GL context.
    pub fn destroy(&mut self, gl: &glow::Context) {
        if let Some(res) = self.resources.take() {
            unsafe {
                gl.delete_program(res.eval_program);
                gl.delete_program(res.present_program);
                gl.delete_vertex_array(res.vao);
                gl.delete_buffer(res.vbo);
                gl.delete_framebuffer(res.fbo);
                for tex in res.field_tex {
                    gl.delete_texture(tex);
                }
            }
        }
        self.slots.has_image = false;
    }
}

impl FieldEvaluator for GlFieldState {
    fn evaluate(&mut self, params: &FieldParams) -> Result<(), RenderError> {
        if self.broken {
            return Err(RenderError::Resource("GPU 求值器不可用".to_string()));
        }
        if params.size.is_empty() {
            return Err(RenderError::EmptyViewport);
        }
        self.queued = Some(*params);
        Ok(())
    }

    /// Hands the request to the paint callback; it is counted as presented
    /// only once the pass has succeeded there.
    fn present(&mut self) {
        if let Some(params) = self.queued.take() {
            self.pending = Some(params);
        }
    }

    /// A request for another size is stale; texture storage is reallocated
    /// lazily by the next evaluation.
    fn resize(&mut self, size: ViewportSize) {
        if self.queued.is_some_and(|p| p.size != size) {
            self.queued = None;
        }
        if self.pending.is_some_and(|p| p.size != size) {
            self.pending = None;
        }
    }
}

// ─── GL helpers ─────────────────────────────────────────────────────────

fn compile_shader(gl: &glow::Context, kind: u32, source: &str) -> Result<glow::Shader, RenderError> {
    unsafe {
        let shader = gl.create_shader(kind).map_err(RenderError::Resource)?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            return Err(RenderError::Shader(log));
        }
        Ok(shader)
    }
}

fn link_program(gl: &glow::Context, frag_src: &str) -> Result<glow::Program, RenderError> {
    unsafe {
        let vert = compile_shader(gl, glow::VERTEX_SHADER, VERT_SRC)?;
        let frag = match compile_shader(gl, glow::FRAGMENT_SHADER, frag_src) {
            Ok(frag) => frag,
            Err(e) => {
                gl.delete_shader(vert);
                return Err(e);
            }
        };

        let program = gl.create_program().map_err(RenderError::Resource)?;
        gl.attach_shader(program, vert);
        gl.attach_shader(program, frag);
        // Both programs share one VAO, so pin the attribute slot.
        gl.bind_attrib_location(program, 0, "a_pos");
        gl.link_program(program);
        let linked = gl.get_program_link_status(program);
        gl.detach_shader(program, vert);
        gl.detach_shader(program, frag);
        gl.delete_shader(vert);
        gl.delete_shader(frag);
        if !linked {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            return Err(RenderError::Shader(log));
        }
        Ok(program)
    }
}

fn init_resources(gl: &glow::Context) -> Result<GlResources, RenderError> {
    unsafe {
        // ── compile & link ──
        let eval_program = link_program(gl, EVAL_FRAG_SRC)?;
        let present_program = link_program(gl, PRESENT_FRAG_SRC)?;

        // ── fullscreen quad (triangle strip) ──
        let vertices: [f32; 8] = [
            -1.0, -1.0,
             1.0, -1.0,
            -1.0,  1.0,
             1.0,  1.0,
        ];
        let vertex_bytes: Vec<u8> = vertices.iter().flat_map(|v| v.to_ne_bytes()).collect();
        let vbo = gl.create_buffer().map_err(RenderError::Resource)?;
        gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
        gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, &vertex_bytes, glow::STATIC_DRAW);

        let vao = gl.create_vertex_array().map_err(RenderError::Resource)?;
        gl.bind_vertex_array(Some(vao));
        gl.enable_vertex_attrib_array(0);
        gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, 8, 0);
        gl.bind_vertex_array(None);
        gl.bind_buffer(glow::ARRAY_BUFFER, None);

        // ── offscreen targets ──
        let field_tex = [create_field_texture(gl)?, create_field_texture(gl)?];

        let fbo = gl.create_framebuffer().map_err(RenderError::Resource)?;

        // ── uniform locations ──
        let loc = |program, name: &str| gl.get_uniform_location(program, name);

        Ok(GlResources {
            eval_program,
            present_program,
            vao,
            vbo,
            fbo,
            field_tex,
            tex_size: [ViewportSize::default(); 2],
            loc_resolution: loc(eval_program, "u_resolution"),
            loc_scale: loc(eval_program, "u_scale"),
            loc_offset: loc(eval_program, "u_offset"),
            loc_max_iterations: loc(eval_program, "u_max_iterations"),
            loc_squared_radius: loc(eval_program, "u_squared_radius"),
            loc_min_intensity: loc(eval_program, "u_min_intensity"),
            loc_gamma: loc(eval_program, "u_gamma"),
            loc_field_tex: loc(present_program, "u_field_tex"),
        })
    }
}

fn create_field_texture(gl: &glow::Context) -> Result<glow::Texture, RenderError> {
    unsafe {
        let tex = gl.create_texture().map_err(RenderError::Resource)?;
        gl.bind_texture(glow::TEXTURE_2D, Some(tex));
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::NEAREST as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::NEAREST as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
        gl.bind_texture(glow::TEXTURE_2D, None);
        Ok(tex)
    }
}

/// (Re)allocate one field texture's storage when the viewport size changed.
fn ensure_texture_size(gl: &glow::Context, res: &mut GlResources, slot: usize, size: ViewportSize) {
    if res.tex_size[slot] == size {
        return;
    }
    unsafe {
        gl.bind_texture(glow::TEXTURE_2D, Some(res.field_tex[slot]));
        gl.tex_image_2d(
            glow::TEXTURE_2D,
            0,
            glow::RGBA8 as i32,
            size.width as i32,
            size.height as i32,
            0,
            glow::RGBA,
            glow::UNSIGNED_BYTE,
            None,
        );
        gl.bind_texture(glow::TEXTURE_2D, None);
    }
    res.tex_size[slot] = size;
}

/// Run the escape-time pass into texture `slot`, then rebind `target_fbo`.
fn run_evaluation(
    gl: &glow::Context,
    res: &GlResources,
    slot: usize,
    params: &FieldParams,
    field: &FieldConfig,
    target_fbo: Option<glow::Framebuffer>,
) -> Result<(), RenderError> {
    let size = params.size;
    unsafe {
        gl.bind_framebuffer(glow::FRAMEBUFFER, Some(res.fbo));
        gl.framebuffer_texture_2d(
            glow::FRAMEBUFFER,
            glow::COLOR_ATTACHMENT0,
            glow::TEXTURE_2D,
            Some(res.field_tex[slot]),
            0,
        );
        let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
        if status != glow::FRAMEBUFFER_COMPLETE {
            gl.bind_framebuffer(glow::FRAMEBUFFER, target_fbo);
            return Err(RenderError::Framebuffer(status));
        }

        gl.viewport(0, 0, size.width as i32, size.height as i32);
        gl.use_program(Some(res.eval_program));
        gl.uniform_2_f32(res.loc_resolution.as_ref(), size.width as f32, size.height as f32);
        gl.uniform_1_f32(res.loc_scale.as_ref(), params.scale as f32);
        gl.uniform_2_f32(res.loc_offset.as_ref(), params.offset.x as f32, params.offset.y as f32);
        gl.uniform_1_f32(res.loc_max_iterations.as_ref(), field.max_iterations.max(1) as f32);
        gl.uniform_1_f32(res.loc_squared_radius.as_ref(), field.squared_radius() as f32);
        gl.uniform_1_f32(res.loc_min_intensity.as_ref(), field.min_intensity as f32);
        gl.uniform_1_f32(res.loc_gamma.as_ref(), field.intensity_gamma as f32);

        gl.bind_vertex_array(Some(res.vao));
        gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4);
        gl.bind_vertex_array(None);
        gl.use_program(None);

        gl.bind_framebuffer(glow::FRAMEBUFFER, target_fbo);
    }
    Ok(())
}

// ─── Public API ─────────────────────────────────────────────────────────

/// Build the [`egui::PaintCallback`] that evaluates (if queued) and presents
/// the field inside `canvas_rect`.
pub fn make_field_callback(
    state: Arc<Mutex<GlFieldState>>,
    canvas_rect: egui::Rect,
) -> egui::PaintCallback {
    let cb = egui_glow::CallbackFn::new(move |info, painter| {
        let gl = painter.gl();
        let Ok(mut guard) = state.lock() else {
            return;
        };
        let st = &mut *guard;

        // ── lazy init ──
        if st.resources.is_none() && !st.broken {
            match init_resources(gl) {
                Ok(res) => st.resources = Some(res),
                Err(e) => {
                    log::error!("GPU 求值器初始化失败: {e}");
                    st.broken = true;
                }
            }
        }
        let Some(res) = st.resources.as_mut() else {
            return;
        };

        unsafe {
            gl.disable(glow::SCISSOR_TEST);
            gl.disable(glow::BLEND);
        }

        // ── evaluate ──
        if let Some(params) = st.pending.take() {
            let back = st.slots.back();
            ensure_texture_size(gl, res, back, params.size);
            let result = run_evaluation(gl, res, back, &params, &st.field, painter.intermediate_fbo());
            st.slots.finish(&result);
            let vp = info.viewport_in_pixels();
            unsafe {
                gl.viewport(
                    vp.left_px as i32,
                    vp.from_bottom_px as i32,
                    vp.width_px as i32,
                    vp.height_px as i32,
                );
            }
        }

        if !st.slots.has_image {
            return;
        }

        // ── present ──
        unsafe {
            gl.use_program(Some(res.present_program));
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(res.field_tex[st.slots.front]));
            gl.uniform_1_i32(res.loc_field_tex.as_ref(), 0);

            gl.bind_vertex_array(Some(res.vao));
            gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4);
            gl.bind_vertex_array(None);

            gl.bind_texture(glow::TEXTURE_2D, None);
            gl.use_program(None);
        }
    });

    egui::PaintCallback {
        rect: canvas_rect,
        callback: Arc::new(cb),
    }
}
