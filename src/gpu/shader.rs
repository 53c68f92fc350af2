// gpu/shader.rs — Shader sources and the compile → link → reflect lifecycle.
//
// The display program is two WGSL modules:
//
//   vertex   — passes the quad corner through as clip position and forwards
//              the texture coordinate.
//   fragment — samples the single-channel edge texture and broadcasts it to
//              RGB at full opacity.
//
// Compilation parses and validates each module with naga, the same frontend
// wgpu runs internally. Doing it up front, on our side, gives us:
//   - the compiler diagnostic as a string (for the log) instead of a wgpu
//     validation panic at pipeline creation time;
//   - reflection over the entry point interfaces, which is how we "link":
//     every fragment input location must be written by the vertex stage
//     with the same type, and the vertex stage must consume the two
//     attributes the renderer feeds (`position`, `tex_coord`).
//
// The result, `LinkedProgram`, is backend-independent. Each GraphicsContext
// turns it into its own program object.

use std::fmt;

use naga::valid::{Capabilities, ValidationFlags, Validator};
use thiserror::Error;

/// Vertex stage: clip position from `position`, forwards `tex_coord`.
pub const VERTEX_SHADER: &str = include_str!("../shaders/quad_vertex.wgsl");

/// Fragment stage: luminance → opaque gray.
pub const FRAGMENT_SHADER: &str = include_str!("../shaders/edge_fragment.wgsl");

/// Attribute name for quad corner positions.
pub const POSITION_ATTRIBUTE: &str = "position";
/// Attribute name for quad texture coordinates.
pub const TEX_COORD_ATTRIBUTE: &str = "tex_coord";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

/// Shader build failures. Each variant carries the diagnostic text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShaderError {
    #[error("could not compile {stage} shader:\n{log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("could not link program:\n{log}")]
    Link { log: String },
}

/// One named value crossing a stage boundary at a `@location`.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceVariable {
    pub name: String,
    pub location: u32,
    ty: naga::TypeInner,
}

/// A parsed and validated single-stage shader module.
#[derive(Debug, Clone)]
pub struct CompiledShader {
    stage: ShaderStage,
    source: String,
    entry_point: String,
    inputs: Vec<InterfaceVariable>,
    outputs: Vec<InterfaceVariable>,
}

impl CompiledShader {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn inputs(&self) -> &[InterfaceVariable] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[InterfaceVariable] {
        &self.outputs
    }
}

/// Reflected vertex attribute slots of a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeLocations {
    pub position: u32,
    pub tex_coord: u32,
}

/// A vertex + fragment pair whose interfaces match.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    vertex: CompiledShader,
    fragment: CompiledShader,
    attributes: AttributeLocations,
}

impl LinkedProgram {
    pub fn vertex(&self) -> &CompiledShader {
        &self.vertex
    }

    pub fn fragment(&self) -> &CompiledShader {
        &self.fragment
    }

    pub fn attributes(&self) -> AttributeLocations {
        self.attributes
    }
}

/// Parse and validate one WGSL module for `stage`.
///
/// The module must contain exactly one entry point of that stage.
pub fn compile(stage: ShaderStage, source: &str) -> Result<CompiledShader, ShaderError> {
    let compile_err = |log: String| ShaderError::Compile { stage, log };

    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| compile_err(e.emit_to_string(source)))?;
    Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .map_err(|e| compile_err(e.emit_to_string(source)))?;

    let mut entries = module.entry_points.iter().filter(|ep| ep.stage == stage.naga());
    let entry = match (entries.next(), entries.next()) {
        (Some(ep), None) => ep,
        (None, _) => return Err(compile_err(format!("no @{stage} entry point"))),
        (Some(_), Some(_)) => return Err(compile_err(format!("more than one @{stage} entry point"))),
    };

    let mut inputs = Vec::new();
    for arg in &entry.function.arguments {
        collect_locations(&module, arg.name.as_deref(), arg.ty, arg.binding.as_ref(), &mut inputs);
    }
    let mut outputs = Vec::new();
    if let Some(result) = &entry.function.result {
        collect_locations(&module, None, result.ty, result.binding.as_ref(), &mut outputs);
    }

    Ok(CompiledShader {
        stage,
        source: source.to_owned(),
        entry_point: entry.name.clone(),
        inputs,
        outputs,
    })
}

/// Flatten an entry point argument or result into its `@location` members.
/// Built-ins are skipped.
fn collect_locations(
    module: &naga::Module,
    name: Option<&str>,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut Vec<InterfaceVariable>,
) {
    let inner = &module.types[ty].inner;
    match binding {
        Some(naga::Binding::Location { location, .. }) => out.push(InterfaceVariable {
            name: name.unwrap_or_default().to_owned(),
            location: *location,
            ty: inner.clone(),
        }),
        Some(naga::Binding::BuiltIn(_)) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = inner {
                for m in members {
                    collect_locations(module, m.name.as_deref(), m.ty, m.binding.as_ref(), out);
                }
            }
        }
    }
}

/// Check the stage interfaces and reflect the attribute locations.
pub fn link(vertex: CompiledShader, fragment: CompiledShader) -> Result<LinkedProgram, ShaderError> {
    let mut log = Vec::new();
    if vertex.stage != ShaderStage::Vertex {
        log.push(format!("expected a vertex shader, got {}", vertex.stage));
    }
    if fragment.stage != ShaderStage::Fragment {
        log.push(format!("expected a fragment shader, got {}", fragment.stage));
    }

    for input in &fragment.inputs {
        match vertex.outputs.iter().find(|o| o.location == input.location) {
            None => log.push(format!(
                "fragment input `{}` at location {} is not written by the vertex stage",
                input.name, input.location
            )),
            Some(output) if output.ty != input.ty => log.push(format!(
                "type mismatch at location {}: vertex writes {:?}, fragment reads {:?}",
                input.location, output.ty, input.ty
            )),
            Some(_) => {}
        }
    }

    let attribute = |name: &str, log: &mut Vec<String>| {
        let found = vertex.inputs.iter().find(|a| a.name == name).map(|a| a.location);
        if found.is_none() {
            log.push(format!("vertex stage has no `{name}` attribute"));
        }
        found
    };
    let position = attribute(POSITION_ATTRIBUTE, &mut log);
    let tex_coord = attribute(TEX_COORD_ATTRIBUTE, &mut log);

    match (position, tex_coord) {
        (Some(position), Some(tex_coord)) if log.is_empty() => Ok(LinkedProgram {
            vertex,
            fragment,
            attributes: AttributeLocations { position, tex_coord },
        }),
        _ => Err(ShaderError::Link { log: log.join("\n") }),
    }
}

/// Compile and link a vertex/fragment source pair.
pub fn build_program(vertex_src: &str, fragment_src: &str) -> Result<LinkedProgram, ShaderError> {
    let vertex = compile(ShaderStage::Vertex, vertex_src)?;
    let fragment = compile(ShaderStage::Fragment, fragment_src)?;
    link(vertex, fragment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_program_links() {
        let program = build_program(VERTEX_SHADER, FRAGMENT_SHADER).unwrap();
        assert_eq!(program.attributes(), AttributeLocations { position: 0, tex_coord: 1 });
        assert_eq!(program.vertex().entry_point(), "vs_main");
        assert_eq!(program.fragment().entry_point(), "fs_main");
    }

    #[test]
    fn test_reflected_interfaces() {
        let vs = compile(ShaderStage::Vertex, VERTEX_SHADER).unwrap();
        let names: Vec<_> = vs.inputs().iter().map(|v| (v.name.as_str(), v.location)).collect();
        assert_eq!(names, vec![("position", 0), ("tex_coord", 1)]);
        // The builtin clip position is not a location output.
        assert_eq!(vs.outputs().len(), 1);
        assert_eq!(vs.outputs()[0].location, 0);
    }

    #[test]
    fn test_syntax_error_reports_compiler_log() {
        let err = compile(ShaderStage::Vertex, "@vertex fn vs_main( -> {").unwrap_err();
        match err {
            ShaderError::Compile { stage, log } => {
                assert_eq!(stage, ShaderStage::Vertex);
                assert!(!log.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_entry_point() {
        let err = compile(ShaderStage::Fragment, VERTEX_SHADER).unwrap_err();
        assert!(matches!(err, ShaderError::Compile { stage: ShaderStage::Fragment, .. }));
    }

    #[test]
    fn test_link_rejects_unwritten_fragment_input() {
        let fs = r#"
            @fragment
            fn fs_main(@location(3) shade: f32) -> @location(0) vec4<f32> {
                return vec4<f32>(shade, shade, shade, 1.0);
            }
        "#;
        let err = build_program(VERTEX_SHADER, fs).unwrap_err();
        match err {
            ShaderError::Link { log } => assert!(log.contains("location 3"), "{log}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_link_rejects_type_mismatch() {
        let fs = r#"
            @fragment
            fn fs_main(@location(0) uv: vec4<f32>) -> @location(0) vec4<f32> {
                return uv;
            }
        "#;
        assert!(matches!(build_program(VERTEX_SHADER, fs), Err(ShaderError::Link { .. })));
    }

    #[test]
    fn test_link_requires_named_attributes() {
        let vs = r#"
            @vertex
            fn vs_main(@location(0) corner: vec2<f32>) -> @builtin(position) vec4<f32> {
                return vec4<f32>(corner, 0.0, 1.0);
            }
        "#;
        let fs = r#"
            @fragment
            fn fs_main() -> @location(0) vec4<f32> {
                return vec4<f32>(1.0);
            }
        "#;
        let err = build_program(vs, fs).unwrap_err();
        match err {
            ShaderError::Link { log } => {
                assert!(log.contains("`position`"));
                assert!(log.contains("`tex_coord`"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_swapped_stages_fail_to_link() {
        let vs = compile(ShaderStage::Vertex, VERTEX_SHADER).unwrap();
        let fs = compile(ShaderStage::Fragment, FRAGMENT_SHADER).unwrap();
        assert!(link(fs, vs).is_err());
    }
}
