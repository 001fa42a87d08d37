//! Declarative description of a tunable kernel.

use crate::error::BuildError;
use crate::kernel::CompiledKernel;
use std::sync::Arc;
use warptune_backend::{Dim3, Driver};
use warptune_compile::{CompileJob, KernelSource, ModuleCompiler};
use warptune_core::{
    Config, ConfigError, ConfigIterator, ConfigSpace, DeviceRepr, Expr, KernelType, Param,
    ParamExpr, TemplateArg, Value,
};

/// Preprocessor define always present in tuned compilations, so kernel
/// sources can detect that they are being built by this library.
const SENTINEL_FLAG: &str = "-DWARPTUNE=1";

/// Describes a kernel and its tuning space.
///
/// Everything that varies per configuration is an [`Expr`] over the builder's
/// parameters: launch geometry, shared memory, template arguments, compiler
/// flags, and preprocessor defines. [`KernelBuilder::compile`] evaluates them
/// against one configuration and submits the result to a compiler.
pub struct KernelBuilder {
    source: KernelSource,
    entry: String,
    space: ConfigSpace,
    block_size: [Expr; 3],
    grid_divisors: [Expr; 3],
    shared_mem: Expr,
    template_args: Vec<Expr>,
    compiler_flags: Vec<Expr>,
    defines: Vec<(String, Expr)>,
    assertions: Vec<Expr>,
}

impl KernelBuilder {
    pub fn new(source: impl Into<KernelSource>, entry: impl Into<String>) -> KernelBuilder {
        KernelBuilder {
            source: source.into(),
            entry: entry.into(),
            space: ConfigSpace::new(),
            block_size: [Expr::scalar(1u32), Expr::scalar(1u32), Expr::scalar(1u32)],
            grid_divisors: [Expr::scalar(1u32), Expr::scalar(1u32), Expr::scalar(1u32)],
            shared_mem: Expr::scalar(0u32),
            template_args: Vec::new(),
            compiler_flags: Vec::new(),
            defines: Vec::new(),
            assertions: Vec::new(),
        }
    }

    pub fn kernel_name(&self) -> &str {
        &self.entry
    }

    pub fn kernel_source(&self) -> &KernelSource {
        &self.source
    }

    pub fn space(&self) -> &ConfigSpace {
        &self.space
    }

    // --- configuration space, delegated ---

    pub fn tune<V: Into<Value>>(
        &mut self,
        name: impl Into<String>,
        values: Vec<V>,
    ) -> Result<ParamExpr, ConfigError> {
        self.space.tune(name, values)
    }

    pub fn tune_with_default<V: Into<Value>>(
        &mut self,
        name: impl Into<String>,
        values: Vec<V>,
        default: impl Into<Value>,
    ) -> Result<ParamExpr, ConfigError> {
        self.space.tune_with_default(name, values, default)
    }

    pub fn restrict(&mut self, restriction: impl Into<Expr>) -> &mut Self {
        self.space.restrict(restriction);
        self
    }

    pub fn params(&self) -> &[Param] {
        self.space.params()
    }

    pub fn iterate(&self) -> Result<ConfigIterator, ConfigError> {
        self.space.iterate()
    }

    pub fn default_config(&self) -> Result<Config, ConfigError> {
        self.space.default_config()
    }

    pub fn load_config(&self, node: &serde_json::Value) -> Result<Config, ConfigError> {
        self.space.load_config(node)
    }

    pub fn is_valid(&self, config: &Config) -> bool {
        self.space.is_valid(config)
    }

    // --- kernel description ---

    /// Thread block dimensions. Also installs the same expressions as grid
    /// divisors, which is right for kernels that process one element per
    /// thread; call [`KernelBuilder::grid_divisors`] afterwards to override.
    pub fn block_size(
        &mut self,
        x: impl Into<Expr>,
        y: impl Into<Expr>,
        z: impl Into<Expr>,
    ) -> &mut Self {
        let (x, y, z) = (x.into(), y.into(), z.into());
        self.grid_divisors(x.clone(), y.clone(), z.clone());
        self.block_size = [x, y, z];
        self
    }

    /// Problem-size divisors determining the launch grid.
    pub fn grid_divisors(
        &mut self,
        x: impl Into<Expr>,
        y: impl Into<Expr>,
        z: impl Into<Expr>,
    ) -> &mut Self {
        self.grid_divisors = [x.into(), y.into(), z.into()];
        self
    }

    /// Dynamic shared memory in bytes.
    pub fn shared_memory(&mut self, bytes: impl Into<Expr>) -> &mut Self {
        self.shared_mem = bytes.into();
        self
    }

    /// Append one template argument expression.
    pub fn template_arg(&mut self, arg: impl Into<Expr>) -> &mut Self {
        self.template_args.push(arg.into());
        self
    }

    /// Append several template argument expressions.
    pub fn template_args(&mut self, args: Vec<Expr>) -> &mut Self {
        self.template_args.extend(args);
        self
    }

    /// Append a type template argument.
    pub fn template_type<T: DeviceRepr + 'static>(&mut self) -> &mut Self {
        self.template_arg(Expr::scalar(KernelType::of::<T>().name()))
    }

    /// Append one compiler flag expression.
    pub fn compiler_flag(&mut self, flag: impl Into<Expr>) -> &mut Self {
        self.compiler_flags.push(flag.into());
        self
    }

    pub fn compiler_flags(&mut self, flags: Vec<Expr>) -> &mut Self {
        self.compiler_flags.extend(flags);
        self
    }

    /// Add a preprocessor define `name=<expr>`.
    pub fn define(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Expr>,
    ) -> Result<&mut Self, BuildError> {
        let name = name.into();
        if self.defines.iter().any(|(existing, _)| *existing == name) {
            return Err(BuildError::DuplicateDefine(name));
        }
        self.defines.push((name, value.into()));
        Ok(self)
    }

    /// Define a macro named after the parameter, bound to its value.
    pub fn define_param(&mut self, param: &ParamExpr) -> Result<&mut Self, BuildError> {
        self.define(param.param().name().to_string(), param)
    }

    /// Install an expression that is both a restriction and a compile-time
    /// assertion: invalid configurations are filtered out of the search, and
    /// compiling one anyway is an error.
    pub fn assertion(&mut self, assertion: impl Into<Expr>) -> &mut Self {
        let assertion = assertion.into();
        self.space.restrict(assertion.clone());
        self.assertions.push(assertion);
        self
    }

    // --- combined tune-and-install conveniences ---

    /// Tune the three block dimensions and install them.
    pub fn tune_block_size(
        &mut self,
        xs: Vec<u32>,
        ys: Vec<u32>,
        zs: Vec<u32>,
    ) -> Result<(ParamExpr, ParamExpr, ParamExpr), ConfigError> {
        let x = self.space.tune("block_size_x", xs)?;
        let y = self.space.tune("block_size_y", ys)?;
        let z = self.space.tune("block_size_z", zs)?;
        self.block_size(&x, &y, &z);
        Ok((x, y, z))
    }

    /// Tune a compiler flag over the given spellings and install it.
    pub fn tune_compiler_flag(
        &mut self,
        name: impl Into<String>,
        values: Vec<String>,
    ) -> Result<ParamExpr, ConfigError> {
        let flag = self.space.tune(name, values)?;
        self.compiler_flag(&flag);
        Ok(flag)
    }

    /// Tune a preprocessor define over the given values and install it.
    pub fn tune_define<V: Into<Value>>(
        &mut self,
        name: impl Into<String>,
        values: Vec<V>,
    ) -> Result<ParamExpr, BuildError> {
        let name = name.into();
        let param = self.space.tune(name.clone(), values)?;
        self.define(name, &param)?;
        Ok(param)
    }

    // --- compilation ---

    /// Evaluate the description against `config` and submit a compilation.
    pub fn compile(
        &self,
        config: &Config,
        parameter_types: &[KernelType],
        compiler: &dyn ModuleCompiler,
        driver: &Arc<dyn Driver>,
    ) -> Result<CompiledKernel, BuildError> {
        for assertion in &self.assertions {
            let holds = assertion.eval(config)?.to_bool()?;
            if !holds {
                return Err(BuildError::AssertionFailed(assertion.name()));
            }
        }

        let mut template_args = Vec::with_capacity(self.template_args.len());
        for arg in &self.template_args {
            let value = arg.eval(config)?;
            template_args.push(TemplateArg::from_value(&value)?);
        }

        let mut options = Vec::new();
        for flag in &self.compiler_flags {
            options.push(flag.eval(config)?.to_string());
        }
        for (name, value) in &self.defines {
            options.push("--define-macro".to_string());
            options.push(format!("{name}={}", value.eval(config)?));
        }
        options.push(SENTINEL_FLAG.to_string());

        let block_size = self.eval_dim3(&self.block_size, config, BLOCK_DIM_NAMES)?;
        let grid_divisor = self.eval_dim3(&self.grid_divisors, config, GRID_DIM_NAMES)?;
        let shared_mem = self.shared_mem.eval(config)?.to_u32()?;

        let job = CompileJob {
            source: self.source.clone(),
            entry: self.entry.clone(),
            template_args,
            parameter_types: parameter_types.to_vec(),
            options,
            device: None,
        };

        let pending = compiler.compile(job, Arc::clone(driver))?;
        Ok(CompiledKernel::new(
            pending,
            block_size,
            grid_divisor,
            shared_mem,
        ))
    }

    fn eval_dim3(
        &self,
        exprs: &[Expr; 3],
        config: &Config,
        names: [&'static str; 3],
    ) -> Result<Dim3, BuildError> {
        let mut out = [0u32; 3];
        for ((expr, name), slot) in exprs.iter().zip(names).zip(&mut out) {
            let value = expr.eval(config)?.to_u32()?;
            if value == 0 {
                return Err(BuildError::ZeroDim { dim: name });
            }
            *slot = value;
        }
        Ok(Dim3::new(out[0], out[1], out[2]))
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut result = self.space.to_json();

        result["kernel_name"] = serde_json::Value::from(self.entry.clone());
        result["kernel_source"] = serde_json::Value::from(self.source.file_name());
        result["block_size"] = serde_json::Value::from(
            self.block_size.iter().map(Expr::to_json).collect::<Vec<_>>(),
        );
        result["grid_divisors"] = serde_json::Value::from(
            self.grid_divisors
                .iter()
                .map(Expr::to_json)
                .collect::<Vec<_>>(),
        );
        result["shared_mem"] = self.shared_mem.to_json();
        result["template_args"] = serde_json::Value::from(
            self.template_args
                .iter()
                .map(Expr::to_json)
                .collect::<Vec<_>>(),
        );
        result["compiler_flags"] = serde_json::Value::from(
            self.compiler_flags
                .iter()
                .map(Expr::to_json)
                .collect::<Vec<_>>(),
        );

        let mut defines = serde_json::Map::new();
        for (name, value) in &self.defines {
            defines.insert(name.clone(), value.to_json());
        }
        result["defines"] = serde_json::Value::Object(defines);

        result
    }
}

const BLOCK_DIM_NAMES: [&str; 3] = ["block_size.x", "block_size.y", "block_size.z"];
const GRID_DIM_NAMES: [&str; 3] = ["grid_divisor.x", "grid_divisor.y", "grid_divisor.z"];

#[cfg(test)]
mod tests {
    use super::*;
    use warptune_backend::SimDriver;
    use warptune_compile::SimCompiler;

    fn sim() -> (Arc<dyn Driver>, SimCompiler) {
        (Arc::new(SimDriver::new()), SimCompiler::new())
    }

    fn builder() -> KernelBuilder {
        KernelBuilder::new(
            KernelSource::inline("k.cu", "__global__ void k() {}"),
            "k",
        )
    }

    #[test]
    fn block_size_defaults_the_grid_divisors() {
        let (driver, compiler) = sim();
        let mut b = builder();
        let (x, _, _) = b.tune_block_size(vec![32, 64], vec![1], vec![1]).unwrap();
        let config = b.default_config().unwrap();
        assert_eq!(config.get(x.param()), Some(&Value::from(32)));

        let kernel = b
            .compile(&config, &[], &compiler, &driver)
            .unwrap();
        assert_eq!(kernel.block_size(), Dim3::new(32, 1, 1));
        assert_eq!(kernel.grid_divisor(), Dim3::new(32, 1, 1));
    }

    #[test]
    fn explicit_grid_divisors_override() {
        let (driver, compiler) = sim();
        let mut b = builder();
        b.block_size(64u32, 1u32, 1u32);
        b.grid_divisors(128u32, 1u32, 1u32);

        let config = b.default_config().unwrap();
        let kernel = b.compile(&config, &[], &compiler, &driver).unwrap();
        assert_eq!(kernel.block_size(), Dim3::new(64, 1, 1));
        assert_eq!(kernel.grid_divisor(), Dim3::new(128, 1, 1));
    }

    #[test]
    fn zero_block_dimension_is_rejected() {
        let (driver, compiler) = sim();
        let mut b = builder();
        b.block_size(0u32, 1u32, 1u32);
        let config = b.default_config().unwrap();
        assert!(matches!(
            b.compile(&config, &[], &compiler, &driver),
            Err(BuildError::ZeroDim { dim: "grid_divisor.x" })
                | Err(BuildError::ZeroDim { dim: "block_size.x" })
        ));
    }

    #[test]
    fn failed_assertion_aborts_compilation() {
        let (driver, compiler) = sim();
        let mut b = builder();
        let tile = b.tune("tile", vec![4, 8]).unwrap();
        b.assertion(tile.ge(8));

        // bypass the restriction filter by constructing the config directly
        let mut config = Config::new();
        config.insert(tile.param().clone(), Value::from(4));
        match b.compile(&config, &[], &compiler, &driver) {
            Err(BuildError::AssertionFailed(name)) => assert_eq!(name, "($tile>=8)"),
            other => panic!("expected AssertionFailed, got {other:?}"),
        }
    }

    #[test]
    fn assertions_also_restrict_the_space() {
        let mut b = builder();
        let tile = b.tune("tile", vec![4, 8]).unwrap();
        b.assertion(tile.ge(8));

        let mut config = Config::new();
        config.insert(tile.param().clone(), Value::from(4));
        assert!(!b.is_valid(&config));
    }

    #[test]
    fn duplicate_defines_are_rejected() {
        let mut b = builder();
        b.define("TILE", 16).unwrap();
        assert!(matches!(
            b.define("TILE", 32),
            Err(BuildError::DuplicateDefine(_))
        ));
    }

    #[test]
    fn defines_and_flags_reach_the_compile_job() {
        let driver: Arc<dyn Driver> = Arc::new(SimDriver::new());
        let mut b = builder();
        let tile = b.tune_define("TILE", vec![16, 32]).unwrap();
        b.tune_compiler_flag(
            "opt",
            vec!["-O3".to_string(), "-O0".to_string()],
        )
        .unwrap();

        let seen = std::sync::Arc::new(std::sync::Mutex::new(None));
        let seen_inner = std::sync::Arc::clone(&seen);
        let compiler = SimCompiler::with_cost_model(move |job| {
            *seen_inner.lock().unwrap() = Some((
                job.define_value("TILE").map(str::to_string),
                job.define_value("WARPTUNE").map(str::to_string),
                job.options.clone(),
            ));
            Ok(1e-3)
        });

        let config = b.default_config().unwrap();
        assert_eq!(config.get(tile.param()), Some(&Value::from(16)));
        b.compile(&config, &[], &compiler, &driver).unwrap();

        let (tile_value, _sentinel, options) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(tile_value.as_deref(), Some("16"));
        assert!(options.contains(&"-O3".to_string()));
        assert!(options.contains(&"-DWARPTUNE=1".to_string()));
    }

    #[test]
    fn structural_json_includes_the_description() {
        let mut b = builder();
        let tile = b.tune("tile", vec![16, 32]).unwrap();
        b.block_size(&tile, 1u32, 1u32);
        b.shared_memory(tile.clone() * 4);

        let json = b.to_json();
        assert_eq!(json["kernel_name"], "k");
        assert_eq!(json["parameters"][0]["name"], "tile");
        assert_eq!(json["block_size"][0]["operator"], "parameter");
        assert_eq!(json["shared_mem"]["operator"], "*");
    }
}
