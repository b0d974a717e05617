use pretty_assertions::assert_eq;
use shir_ir::codec::{decode, encode, DecodeError, MAGIC, VERSION};
use shir_ir::attributes::{InterpolationSampling, InterpolationType};
use shir_ir::types::{TexelFormat, TextureDimension};
use shir_ir::*;

const NO_ARGS: [Value; 0] = [];

/// Encodes, decodes and checks that the copy prints exactly like the source
fn roundtrip(module: &Module) -> Module {
    let bytes = encode(module).unwrap();
    let decoded = decode(&bytes).unwrap();
    assert_eq!(disassemble(&decoded), disassemble(module));
    decoded
}

fn graphics_module() -> Module {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let vec2f = b.types().vec2(TypeId::F32);
    let vec4f = b.types().vec4(TypeId::F32);
    let params = b.types().structure(
        "Params",
        vec![
            ("scale".to_string(), TypeId::F32, IoAttributes::default()),
            ("offset".to_string(), vec2f, IoAttributes::default()),
        ],
    );
    let texture = b.types().sampled_texture(TextureDimension::D2, TypeId::F32);
    let sampler = b.types().sampler();
    let uniform = b.types().ptr(AddressSpace::Uniform, params, Access::Read);
    let texture_ptr = b.types().ptr(AddressSpace::Handle, texture, Access::Read);
    let sampler_ptr = b.types().ptr(AddressSpace::Handle, sampler, Access::Read);

    let root = b.module().root();
    let (uniforms, tex, samp) = b.append(root, |b| {
        let uniforms = b.binding_var(uniform, 1, 0);
        b.name(uniforms, "params");
        let tex = b.binding_var(texture_ptr, 0, 0);
        b.name(tex, "tex");
        let samp = b.binding_var(sampler_ptr, 0, 1);
        b.name(samp, "samp");
        (uniforms, tex, samp)
    });

    let vs = b.function("vs", vec4f, Some(PipelineStage::Vertex));
    let index = b.function_param(TypeId::U32);
    b.name(index, "index");
    b.set_params(vs, vec![index]);
    b.module_mut().set_param_attributes(index, IoAttributes::builtin(BuiltinValue::VertexIndex));
    b.module_mut().function_mut(vs).return_attributes = IoAttributes::builtin(BuiltinValue::Position);
    let body = b.function_block(vs);
    b.append(body, |b| {
        let x = b.convert(TypeId::F32, index);
        let p = b.load(uniforms);
        let scale = b.access(TypeId::F32, p, [0u32]);
        let scaled = b.multiply(TypeId::F32, x, scale);
        let (scaled, zero, one) = (b.value(scaled), b.value(0.0f32), b.value(1.0f32));
        let position = b.construct(vec4f, [scaled, zero, zero, one]);
        b.return_value(vs, position);
    });

    let fs = b.function("fs", vec4f, Some(PipelineStage::Fragment));
    let uv = b.function_param(vec2f);
    b.name(uv, "uv");
    b.set_params(fs, vec![uv]);
    b.module_mut().set_param_attributes(uv, IoAttributes::location(0));
    b.module_mut().function_mut(fs).return_attributes = IoAttributes::location(0);
    let body = b.function_block(fs);
    b.append(body, |b| {
        let t = b.load(tex);
        let s = b.load(samp);
        let (t, s) = (b.value(t), b.value(s));
        let color = b.call_builtin(vec4f, BuiltinFn::TextureSample, [t, s, uv]);
        b.return_value(fs, color);
    });
    module
}

/// `sum(n)` adds `0..n` with loop-carried block parameters
fn loop_module() -> Module {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let func = b.function("sum", TypeId::U32, None);
    let n = b.function_param(TypeId::U32);
    b.name(n, "n");
    b.set_params(func, vec![n]);
    let body = b.function_block(func);
    b.append(body, |b| {
        let lp = b.loop_();
        let total = b.add_result(lp, TypeId::U32);
        let init = b.module_mut().ensure_initializer(lp);
        b.append(init, |b| b.next_iteration(lp, [0u32, 0u32]));

        let lp_body = b.module().loop_body(lp);
        let (i, acc) = (b.block_param(TypeId::U32), b.block_param(TypeId::U32));
        b.name(i, "i");
        b.name(acc, "acc");
        b.module_mut().set_block_params(lp_body, vec![i, acc]);
        b.append(lp_body, |b| {
            let more = b.less_than(TypeId::BOOL, i, n);
            let guard = b.if_(more);
            let (t, f) = (b.module().true_block(guard), b.module().false_block(guard));
            b.append(t, |b| b.exit_if(guard, NO_ARGS));
            b.append(f, |b| b.exit_loop(lp, [acc]));
            let next_acc = b.add(TypeId::U32, acc, i);
            let next_acc = b.value(next_acc);
            b.continue_(lp, [i, next_acc]);
        });

        let continuing = b.module().loop_continuing(lp);
        let (ci, cacc) = (b.block_param(TypeId::U32), b.block_param(TypeId::U32));
        b.module_mut().set_block_params(continuing, vec![ci, cacc]);
        b.append(continuing, |b| {
            let next = b.add(TypeId::U32, ci, 1u32);
            let stop = b.greater_than_equal(TypeId::BOOL, next, 100u32);
            let next = b.value(next);
            b.break_if(lp, stop, [next, cacc], [cacc]);
        });
        b.return_value(func, total);
    });
    module
}

fn switch_module() -> Module {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let func = b.function("classify", TypeId::I32, None);
    let x = b.function_param(TypeId::I32);
    b.set_params(func, vec![x]);
    let body = b.function_block(func);
    b.append(body, |b| {
        let sw = b.switch(x);
        let class = b.add_result(sw, TypeId::I32);
        let low = b.case(sw, [Some(Scalar::I32(0)), Some(Scalar::I32(-1))]);
        let rest = b.case(sw, [Some(Scalar::I32(1)), None]);
        b.append(low, |b| b.exit_switch(sw, [10i32]));
        b.append(rest, |b| {
            let doubled = b.multiply(TypeId::I32, x, 2i32);
            b.exit_switch(sw, [doubled]);
        });
        b.return_value(func, class);
    });
    module
}

fn compute_module() -> Module {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let vec3u = b.types().vec3(TypeId::U32);
    let data = b.types().runtime_array(TypeId::U32);
    let buffer_ty = b.types().ptr(AddressSpace::Storage, data, Access::ReadWrite);
    let element = b.types().ptr(AddressSpace::Storage, TypeId::U32, Access::ReadWrite);
    let root = b.module().root();
    let (width, buffer) = b.append(root, |b| {
        let width = b.override_init(TypeId::U32, 32u32);
        b.name(width, "width");
        let buffer = b.binding_var(buffer_ty, 0, 2);
        b.name(buffer, "data");
        (width, buffer)
    });
    b.module_mut().set_override_id(width, 7);

    let func = b.compute_function("main", 1, 1, 1);
    let width = b.value(width);
    if let Some(size) = b.module_mut().function_mut(func).workgroup_size.as_mut() {
        size[0] = width;
    }
    let gid = b.function_param(vec3u);
    b.name(gid, "gid");
    b.set_params(func, vec![gid]);
    b.module_mut()
        .set_param_attributes(gid, IoAttributes::builtin(BuiltinValue::GlobalInvocationId));
    let body = b.function_block(func);
    b.append(body, |b| {
        let x = b.swizzle(TypeId::U32, gid, vec![0]);
        let slot = b.access(element, buffer, [x]);
        let old = b.load(slot);
        let bumped = b.add(TypeId::U32, old, 1u32);
        b.store(slot, bumped);
        b.call_builtin(TypeId::VOID, BuiltinFn::WorkgroupBarrier, NO_ARGS);
        b.return_(func);
    });
    module
}

/// Every remaining resource type shape, IO attribute and simple instruction kind
fn resources_module() -> Module {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let vec4f = b.types().vec4(TypeId::F32);
    let vec4h = b.types().vec4(TypeId::F16);
    let handles = [
        b.types().storage_texture(TextureDimension::D2, TexelFormat::Rgba8Unorm, Access::Write),
        b.types().depth_texture(TextureDimension::Cube),
        b.types().get(Type::MultisampledTexture { dim: TextureDimension::D2, sampled: TypeId::I32 }),
        b.types().get(Type::DepthMultisampledTexture { dim: TextureDimension::D2 }),
        b.types().get(Type::ExternalTexture),
        b.types().comparison_sampler(),
    ];
    let handle_ptrs = handles.map(|ty| b.types().ptr(AddressSpace::Handle, ty, Access::Read));
    let counter_ty = b.types().atomic(TypeId::U32);
    let counter_ptr = b.types().ptr(AddressSpace::Storage, counter_ty, Access::ReadWrite);
    let half_ptr = b.types().ptr(AddressSpace::Private, vec4h, Access::ReadWrite);

    let root = b.module().root();
    let (counter, halves) = b.append(root, |b| {
        for (binding, ptr) in handle_ptrs.into_iter().enumerate() {
            b.binding_var(ptr, 0, binding as u32);
        }
        let counter = b.binding_var(counter_ptr, 1, 0);
        b.name(counter, "counter");
        let zero = b.zero(vec4h);
        let halves = b.var_init(half_ptr, zero);
        b.name(halves, "halves");
        (counter, halves)
    });

    let fs = b.function("shade", vec4f, Some(PipelineStage::Fragment));
    let color = b.function_param(vec4f);
    b.name(color, "color");
    b.set_params(fs, vec![color]);
    b.module_mut().set_param_attributes(
        color,
        IoAttributes {
            location: Some(1),
            interpolation: Some(Interpolation {
                ty: InterpolationType::Linear,
                sampling: Some(InterpolationSampling::Sample),
            }),
            ..IoAttributes::default()
        },
    );
    b.module_mut().function_mut(fs).return_attributes = IoAttributes {
        invariant: true,
        ..IoAttributes::location(0)
    };
    let body = b.function_block(fs);
    b.append(body, |b| {
        let h = b.load_vector_element(halves, 2u32);
        let negated = b.negation(TypeId::F16, h);
        b.store_vector_element(halves, 0u32, negated);
        b.store_vector_element(halves, 1u32, Scalar::F16(0.5));
        let bits = b.bitcast(TypeId::U32, 1.5f32);
        let flipped = b.complement(TypeId::U32, bits);
        let (counter, flipped) = (b.value(counter), b.value(flipped));
        b.call_builtin(TypeId::U32, BuiltinFn::AtomicAdd, [counter, flipped]);
        let skip = b.not(TypeId::BOOL, false);
        let guard = b.if_(skip);
        let (t, f) = (b.module().true_block(guard), b.module().false_block(guard));
        b.append(t, |b| {
            b.discard();
            b.exit_if(guard, NO_ARGS);
        });
        b.append(f, |b| {
            b.terminate_invocation();
            b.exit_if(guard, NO_ARGS);
        });
        b.return_value(fs, color);
    });

    let never = b.function("never", TypeId::VOID, None);
    let body = b.function_block(never);
    b.append(body, |b| b.unreachable());
    module
}

#[test]
fn test_graphics_entry_points_roundtrip() {
    let decoded = roundtrip(&graphics_module());
    let fs = decoded.functions()[1];
    assert_eq!(decoded.function(fs).return_attributes, IoAttributes::location(0));
}

#[test]
fn test_resource_types_and_attributes_roundtrip() {
    let module = resources_module();
    let decoded = roundtrip(&module);
    let shade = decoded.functions()[0];
    let color = decoded.function(shade).params()[0];
    assert_eq!(decoded.name_of(color), Some("color"));
    assert!(decoded.function(shade).return_attributes.invariant);
    assert_eq!(decoded.types.len(), module.types.len());
}

#[test]
fn test_loop_block_params_roundtrip() {
    let module = loop_module();
    validate(&module).unwrap();
    let decoded = roundtrip(&module);
    validate(&decoded).unwrap();
}

#[test]
fn test_switch_results_roundtrip() {
    let module = switch_module();
    validate(&module).unwrap();
    let decoded = roundtrip(&module);
    validate(&decoded).unwrap();
}

#[test]
fn test_override_workgroup_size_roundtrip() {
    let decoded = roundtrip(&compute_module());
    let main = decoded.functions()[0];
    let size = decoded.function(main).workgroup_size.unwrap();
    assert_eq!(decoded.name_of(size[0]), Some("width"));
}

#[test]
fn test_encoding_is_deterministic() {
    let module = loop_module();
    assert_eq!(encode(&module).unwrap(), encode(&module).unwrap());
    let again = roundtrip(&module);
    assert_eq!(encode(&again).unwrap(), encode(&module).unwrap());
}

#[test]
fn test_empty_module_roundtrips() {
    let decoded = roundtrip(&Module::new());
    assert!(decoded.functions().is_empty());
}

#[test]
fn test_malformed_inputs_are_rejected() {
    let bytes = encode(&switch_module()).unwrap();

    assert!(matches!(decode(&[]), Err(DecodeError::Truncated)));
    assert!(matches!(decode(b"\x7fELF\x01"), Err(DecodeError::BadMagic)));

    let mut future = MAGIC.to_vec();
    future.push(VERSION + 1);
    future.extend_from_slice(&bytes[MAGIC.len() + 1..]);
    assert!(matches!(decode(&future), Err(DecodeError::UnsupportedVersion(v)) if v == VERSION + 1));

    let mut garbage = MAGIC.to_vec();
    garbage.push(VERSION);
    garbage.extend_from_slice(&[0xff; 16]);
    assert!(decode(&garbage).is_err());

    let cut = &bytes[..bytes.len() / 2];
    assert!(matches!(decode(cut), Err(DecodeError::Malformed(_))));
}
