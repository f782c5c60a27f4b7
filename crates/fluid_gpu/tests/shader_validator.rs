//! Parses and validates every composed WGSL module with naga, using the
//! same prelude composition the device sees.

use fluid_gpu::gpu::shaders::ShaderId;

fn validate(id: ShaderId) -> Result<naga::Module, String> {
    let source = id.source();
    let module = naga::front::wgsl::parse_str(&source)
        .map_err(|e| format!("Failed to parse {}:\n{}", id.label(), e.emit_to_string(&source)))?;
    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| format!("Failed to validate {}:\n{:?}", id.label(), e))?;
    Ok(module)
}

#[test]
fn validate_all_shaders() {
    let errors: Vec<String> = ShaderId::ALL
        .iter()
        .filter_map(|&id| validate(id).err())
        .collect();
    if !errors.is_empty() {
        panic!("Shader validation failed:\n{}", errors.join("\n"));
    }
}

#[test]
fn every_module_has_compute_entry_points() {
    for id in ShaderId::ALL {
        let module = validate(id).unwrap();
        assert!(!module.entry_points.is_empty(), "{} has no entry points", id.label());
        for entry in &module.entry_points {
            assert_eq!(entry.stage, naga::ShaderStage::Compute, "{}::{}", id.label(), entry.name);
            assert_eq!(entry.workgroup_size[1], 1, "{}::{}", id.label(), entry.name);
            assert_eq!(entry.workgroup_size[2], 1, "{}::{}", id.label(), entry.name);
        }
    }
}

#[test]
fn flip_kernels_share_the_grid_constants() {
    let module = validate(ShaderId::ParticleToGrid).unwrap();
    let sim = module
        .global_variables
        .iter()
        .find(|(_, var)| var.name.as_deref() == Some("sim"))
        .map(|(_, var)| var.binding.clone())
        .expect("grid prelude declares `sim`");
    assert_eq!(sim, Some(naga::ResourceBinding { group: 0, binding: 0 }));
}
