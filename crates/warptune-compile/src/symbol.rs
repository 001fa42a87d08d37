//! Symbol construction and compile option assembly.

use warptune_core::{KernelType, TemplateArg};

/// Build the fully-typed name expression handed to the toolchain:
/// `(void(*)(T1,...,Tn))entry<A1,...,Am>`.
///
/// The function-pointer cast pins down the parameter types so the toolchain
/// resolves the right overload; the template argument list is omitted when
/// the kernel is not a template.
pub fn symbol_expression(
    entry: &str,
    template_args: &[TemplateArg],
    parameter_types: &[KernelType],
) -> String {
    let params = parameter_types
        .iter()
        .map(KernelType::name)
        .collect::<Vec<_>>()
        .join(",");

    let mut symbol = format!("(void(*)({params})){entry}");

    if !template_args.is_empty() {
        let args = template_args
            .iter()
            .map(TemplateArg::token)
            .collect::<Vec<_>>()
            .join(",");
        symbol.push('<');
        symbol.push_str(&args);
        symbol.push('>');
    }

    symbol
}

/// Final option list for one compilation.
///
/// Adds `-std=c++11` unless the caller already picked a standard, and the
/// architecture flag derived from the target device's compute capability.
pub fn assemble_options(options: &[String], capability: (u32, u32)) -> Vec<String> {
    let mut assembled: Vec<String> = options.to_vec();

    let mentions_std = options.iter().any(|opt| opt.starts_with("-std"));
    if !mentions_std {
        assembled.push("-std=c++11".to_string());
    }

    let (major, minor) = capability;
    assembled.push(format!("--gpu-architecture=compute_{major}{minor}"));
    assembled
}

#[cfg(test)]
mod tests {
    use super::*;
    use warptune_core::Value;

    #[test]
    fn plain_kernel_symbol() {
        let symbol = symbol_expression(
            "vector_add",
            &[],
            &[KernelType::of::<*mut f32>(), KernelType::of::<u32>()],
        );
        assert_eq!(symbol, "(void(*)(float*,unsigned int))vector_add");
    }

    #[test]
    fn templated_kernel_symbol() {
        let args = vec![
            TemplateArg::from_type(KernelType::of::<f32>()),
            TemplateArg::from_value(&Value::from(64)).unwrap(),
        ];
        let symbol = symbol_expression("matmul", &args, &[KernelType::of::<*const f32>()]);
        assert_eq!(symbol, "(void(*)(const float*))matmul<float,(long long)64>");
    }

    #[test]
    fn default_standard_is_added_once() {
        let assembled = assemble_options(&["-O3".to_string()], (8, 0));
        assert!(assembled.contains(&"-std=c++11".to_string()));
        assert!(assembled.contains(&"--gpu-architecture=compute_80".to_string()));

        let explicit = assemble_options(&["-std=c++17".to_string()], (7, 5));
        assert!(!explicit.contains(&"-std=c++11".to_string()));
        assert!(explicit.contains(&"--gpu-architecture=compute_75".to_string()));
    }
}
