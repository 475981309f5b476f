//! `raya-weave inspect`: disassemble a class unit

use anyhow::Context;
use raya_classfile::{access, disassemble, ClassUnit, MethodDef, VType};
use std::fmt::Write;
use std::path::PathBuf;

pub fn execute(unit: PathBuf) -> anyhow::Result<()> {
    let bytes = std::fs::read(&unit).with_context(|| format!("failed to read {}", unit.display()))?;
    let decoded = ClassUnit::decode(&bytes).with_context(|| format!("failed to decode {}", unit.display()))?;
    print!("{}", render(&decoded)?);
    Ok(())
}

fn render(unit: &ClassUnit) -> anyhow::Result<String> {
    let mut out = String::new();
    let kind = if unit.is_interface() { "interface" } else { "class" };
    writeln!(out, "{} {}", kind, unit.name)?;
    if let Some(super_name) = &unit.super_name {
        writeln!(out, "  extends {}", super_name)?;
    }
    if !unit.interfaces.is_empty() {
        writeln!(out, "  implements {}", unit.interfaces.join(", "))?;
    }
    if let Some(source) = &unit.source_file {
        writeln!(out, "  source {}", source)?;
    }
    for import in &unit.imports {
        writeln!(out, "  import {}", import)?;
    }
    writeln!(out, "  constants {}", unit.constants.len())?;

    for method in &unit.methods {
        writeln!(out)?;
        writeln!(out, "{}{}{} {}", flags(method), method.name, method.descriptor, woven_marker(method))?;
        let Some(code) = &method.code else {
            continue;
        };
        writeln!(out, "  max_stack={} max_locals={}", code.max_stack, code.max_locals)?;
        for line in disassemble(code, &unit.constants)?.lines() {
            writeln!(out, "    {}", line)?;
        }
        for h in &code.handlers {
            let catch = h
                .catch_type
                .and_then(|idx| unit.constants.get_class(idx))
                .unwrap_or("any");
            writeln!(out, "  handler [{}, {}) -> {} catch {}", h.start, h.end, h.handler, catch)?;
        }
        for frame in &code.frames {
            writeln!(
                out,
                "  frame @{} locals [{}] stack [{}]",
                frame.offset,
                vtypes(&frame.locals),
                vtypes(&frame.stack)
            )?;
        }
    }
    Ok(out)
}

fn flags(method: &MethodDef) -> String {
    let names = [
        (access::PUBLIC, "public "),
        (access::PRIVATE, "private "),
        (access::STATIC, "static "),
        (access::FINAL, "final "),
        (access::ABSTRACT, "abstract "),
        (access::NATIVE, "native "),
        (access::SYNTHETIC, "synthetic "),
    ];
    names
        .iter()
        .filter(|(flag, _)| method.access & flag != 0)
        .map(|(_, name)| *name)
        .collect()
}

fn woven_marker(method: &MethodDef) -> &'static str {
    if method.is_woven() {
        "[woven]"
    } else {
        ""
    }
}

fn vtypes(types: &[VType]) -> String {
    types
        .iter()
        .map(|t| match t {
            VType::Top => "top".to_string(),
            VType::Integer => "int".to_string(),
            VType::Float => "float".to_string(),
            VType::Long => "long".to_string(),
            VType::Double => "double".to_string(),
            VType::Null => "null".to_string(),
            VType::Object(name) => name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
