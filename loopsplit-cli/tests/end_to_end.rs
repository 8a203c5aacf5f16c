//! End-to-end test of the real class-file codec: builds a tiny but valid
//! `.class` file whose one method has an irreducible loop at the bytecode
//! level, runs it through `transform_method`, writes the result back out,
//! and re-parses the rewritten bytes to confirm the pipeline round-trips.

use loopsplit_cli::classio::class::ClassFile;
use loopsplit_cli::classio::{CapturedMethodSink, ClassMethodAdapter};
use loopsplit_core::transform_method;
use loopsplit_core::verify::StructuralVerifier;

fn push_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn push_utf8(buf: &mut Vec<u8>, s: &str) {
    buf.push(1); // CONSTANT_Utf8
    push_u16(buf, s.len() as u16);
    buf.extend_from_slice(s.as_bytes());
}

/// The bytecode of a method with the classic two-node irreducible shape:
/// `ifeq` sends control either straight to `C` or through an intermediate
/// `goto` into `B`; `B` falls into `C`; `C` branches back to `B` or falls
/// through to `return`. Neither `B` nor `C` dominates the other, so this
/// does not reduce under T1/T2 alone.
///
/// ```text
/// 0:  iconst_0
/// 1:  istore_1
/// 2:  iload_1
/// 3:  ifeq   -> 15   (C)
/// 6:  goto   -> 9    (B)
/// 9:  iinc 1, 1      (B)
/// 12: goto   -> 15   (C)
/// 15: iload_1        (C)
/// 16: ifgt   -> 9    (back edge to B)
/// 19: return
/// ```
fn irreducible_loop_bytecode() -> Vec<u8> {
    vec![
        0x03, // 0: iconst_0
        0x3C, // 1: istore_1
        0x1B, // 2: iload_1
        0x99, 0x00, 0x0C, // 3: ifeq +12 -> 15
        0xA7, 0x00, 0x03, // 6: goto +3 -> 9
        0x84, 0x01, 0x01, // 9: iinc 1, +1
        0xA7, 0x00, 0x03, // 12: goto +3 -> 15
        0x1B, // 15: iload_1
        0x9D, 0xFF, 0xF9, // 16: ifgt -7 -> 9
        0xB1, // 19: return
    ]
}

/// Assembles a minimal but fully valid `.class` file with one method,
/// `loop()V`, whose body is [`irreducible_loop_bytecode`].
fn class_with_irreducible_method() -> Vec<u8> {
    let code = irreducible_loop_bytecode();

    let mut code_info = Vec::new();
    push_u16(&mut code_info, 2); // max_stack
    push_u16(&mut code_info, 2); // max_locals
    push_u32(&mut code_info, code.len() as u32);
    code_info.extend_from_slice(&code);
    push_u16(&mut code_info, 0); // exception_table_length
    push_u16(&mut code_info, 0); // Code's own attributes_count

    let mut class = Vec::new();
    push_u32(&mut class, 0xCAFEBABE);
    push_u16(&mut class, 0); // minor_version
    push_u16(&mut class, 52); // major_version (Java 8)

    push_u16(&mut class, 4); // constant_pool_count (3 real entries + tombstone)
    push_utf8(&mut class, "Code"); // #1
    push_utf8(&mut class, "loop"); // #2
    push_utf8(&mut class, "()V"); // #3

    push_u16(&mut class, 0x0001); // access_flags
    push_u16(&mut class, 0); // this_class
    push_u16(&mut class, 0); // super_class
    push_u16(&mut class, 0); // interfaces_count

    push_u16(&mut class, 0); // fields_count

    push_u16(&mut class, 1); // methods_count
    push_u16(&mut class, 0x0001); // method access_flags
    push_u16(&mut class, 2); // name_index -> "loop"
    push_u16(&mut class, 3); // descriptor_index -> "()V"
    push_u16(&mut class, 1); // method attributes_count
    push_u16(&mut class, 1); // attribute name_index -> "Code"
    push_u32(&mut class, code_info.len() as u32);
    class.extend_from_slice(&code_info);

    push_u16(&mut class, 0); // class attributes_count

    class
}

#[test]
fn irreducible_method_is_split_and_reparses_cleanly() {
    let original_bytes = class_with_irreducible_method();
    let mut class = ClassFile::parse(&original_bytes).expect("valid minimal class");
    assert_eq!(class.methods.len(), 1);

    let adapter = ClassMethodAdapter::new(&class, &class.methods[0])
        .expect("Code attribute decodes")
        .expect("method has a Code attribute");

    let mut sink = CapturedMethodSink::default();
    let mut verifier = StructuralVerifier;
    let stats = transform_method(&adapter, &mut sink, &mut verifier).expect("irreducible loop is split and verifies clean");

    assert!(stats.regions_cloned > 0, "this fixture is irreducible and must require at least one clone");

    adapter.apply(&mut class.methods[0], sink.instructions, sink.try_catch).expect("rewritten Code attribute encodes");

    let rewritten_bytes = class.write();
    assert_ne!(rewritten_bytes, original_bytes, "a split method must produce different bytes");

    // The rewritten bytes must themselves be a well-formed class file whose
    // method, once re-decoded, is already reducible (idempotence).
    let mut reparsed = ClassFile::parse(&rewritten_bytes).expect("rewritten bytes are a valid class file");
    assert_eq!(reparsed.methods.len(), 1);

    let second_adapter = ClassMethodAdapter::new(&reparsed, &reparsed.methods[0])
        .expect("Code attribute decodes")
        .expect("method still has a Code attribute");
    let mut second_sink = CapturedMethodSink::default();
    let mut second_verifier = StructuralVerifier;
    let second_stats = transform_method(&second_adapter, &mut second_sink, &mut second_verifier)
        .expect("already-reducible method re-verifies cleanly");
    assert_eq!(second_stats.regions_cloned, 0, "a second pass over the rewritten method must find nothing left to split");

    second_adapter
        .apply(&mut reparsed.methods[0], second_sink.instructions, second_sink.try_catch)
        .expect("re-encoding an unchanged method still succeeds");
    assert_eq!(reparsed.write(), rewritten_bytes, "a no-op second pass must not change the bytes");
}

#[test]
fn reducible_method_is_left_unchanged() {
    // A plain `if` diamond: both the taken and fall-through paths converge
    // on the same `return`, so this is reducible with no loop at all.
    let code: Vec<u8> = vec![
        0x03, // 0: iconst_0
        0x3C, // 1: istore_1
        0x1B, // 2: iload_1
        0x99, 0x00, 0x06, // 3: ifeq +6 -> 9
        0x84, 0x01, 0x01, // 6: iinc 1, +1
        0xB1, // 9: return
    ];

    let mut code_info = Vec::new();
    push_u16(&mut code_info, 2);
    push_u16(&mut code_info, 2);
    push_u32(&mut code_info, code.len() as u32);
    code_info.extend_from_slice(&code);
    push_u16(&mut code_info, 0);
    push_u16(&mut code_info, 0);

    let mut class = Vec::new();
    push_u32(&mut class, 0xCAFEBABE);
    push_u16(&mut class, 0);
    push_u16(&mut class, 52);
    push_u16(&mut class, 4);
    push_utf8(&mut class, "Code");
    push_utf8(&mut class, "straightLine");
    push_utf8(&mut class, "()V");
    push_u16(&mut class, 0x0001);
    push_u16(&mut class, 0);
    push_u16(&mut class, 0);
    push_u16(&mut class, 0);
    push_u16(&mut class, 0);
    push_u16(&mut class, 1);
    push_u16(&mut class, 0x0001);
    push_u16(&mut class, 2);
    push_u16(&mut class, 3);
    push_u16(&mut class, 1);
    push_u16(&mut class, 1);
    push_u32(&mut class, code_info.len() as u32);
    class.extend_from_slice(&code_info);
    push_u16(&mut class, 0);

    let parsed = ClassFile::parse(&class).expect("valid minimal class");
    let adapter = ClassMethodAdapter::new(&parsed, &parsed.methods[0])
        .expect("Code attribute decodes")
        .expect("method has a Code attribute");

    let mut sink = CapturedMethodSink::default();
    let mut verifier = StructuralVerifier;
    let stats = transform_method(&adapter, &mut sink, &mut verifier).expect("already-reducible method verifies cleanly");
    assert_eq!(stats.regions_cloned, 0, "a reducible method must not be modified");
}
