//! Contexto JavaScript aislado (boa) con el conjunto cerrado de globales que ve
//! el código generado: `React`, `console`, `module`/`exports` y `require`.

use std::time::{Duration, Instant};

use boa_engine::{
    js_string,
    object::{FunctionObjectBuilder, ObjectInitializer},
    property::Attribute,
    Context, JsError, JsNativeError, JsObject, JsResult, JsString, JsValue, NativeFunction, Source,
};
use tracing::{debug, warn};

use super::budget::BUDGET_HOOK;
use crate::config::SandboxLimits;

const REACT_SHIM: &str = include_str!("react_shim.js");

/// Punto de entrada elegido: una función componente o un valor renderizable fijo.
#[derive(Debug, Clone)]
pub enum Entry {
    Callable(JsObject),
    Element(JsValue),
}

pub struct Runtime {
    context: Context,
    props_json: JsObject,
}

impl Runtime {
    /// Crea un contexto nuevo. Nada se comparte entre llamadas. El plazo de
    /// `limits.timeout_ms` empieza a contar aquí y cubre resolución y render.
    pub fn new(limits: &SandboxLimits) -> Result<Self, String> {
        let mut context = Context::default();
        context
            .runtime_limits_mut()
            .set_loop_iteration_limit(limits.loop_iteration_limit);
        context
            .runtime_limits_mut()
            .set_recursion_limit(limits.recursion_limit);

        install_console(&mut context).map_err(|e| e.to_string())?;
        install_budget(&mut context, Duration::from_millis(limits.timeout_ms))
            .map_err(|e| e.to_string())?;
        context
            .register_global_callable(
                js_string!("require"),
                1,
                NativeFunction::from_fn_ptr(require_blocked),
            )
            .map_err(|e| e.to_string())?;

        let helpers = context
            .eval(Source::from_bytes(REACT_SHIM))
            .map_err(|e| format!("No se pudo cargar el shim de React: {e}"))?;
        let props_json = helpers
            .as_object()
            .and_then(|h| h.get(js_string!("propsJson"), &mut context).ok())
            .and_then(|f| f.as_callable().cloned())
            .ok_or_else(|| "El shim de React no expone propsJson".to_string())?;

        Ok(Self {
            context,
            props_json,
        })
    }

    pub fn eval(&mut self, code: &str) -> Result<JsValue, String> {
        self.context
            .eval(Source::from_bytes(code))
            .map_err(|e| e.to_string())
    }

    /// Busca un identificador global. Si no existe (o falla) devuelve `None`.
    pub fn lookup(&mut self, name: &str) -> Option<Entry> {
        let value = self.context.eval(Source::from_bytes(name)).ok()?;
        classify(value)
    }

    pub fn default_export(&mut self) -> Option<Entry> {
        let exports = self.module_exports()?;
        let value = exports
            .as_object()?
            .get(js_string!("default"), &mut self.context)
            .ok()?;
        classify(value)
    }

    /// `module.exports` sólo cuenta si es en sí mismo una función.
    pub fn exports_callable(&mut self) -> Option<Entry> {
        let exports = self.module_exports()?;
        exports
            .as_callable()
            .map(|f| Entry::Callable(f.clone()))
    }

    fn module_exports(&mut self) -> Option<JsValue> {
        self.context
            .eval(Source::from_bytes("module.exports"))
            .ok()
            .filter(|v| !v.is_null_or_undefined())
    }

    /// Invoca la entrada sin props (un objeto vacío, como `<Entry />`).
    pub fn invoke(&mut self, entry: &Entry) -> Result<JsValue, String> {
        match entry {
            Entry::Callable(f) => {
                let props = ObjectInitializer::new(&mut self.context).build();
                f.call(&JsValue::undefined(), &[props.into()], &mut self.context)
                    .map_err(|e| e.to_string())
            }
            Entry::Element(value) => Ok(value.clone()),
        }
    }

    pub fn call(&mut self, f: &JsObject, props: &JsValue) -> JsResult<JsValue> {
        f.call(&JsValue::undefined(), &[props.clone()], &mut self.context)
    }

    pub fn get(&mut self, obj: &JsObject, key: &str) -> JsResult<JsValue> {
        obj.get(JsString::from(key), &mut self.context)
    }

    pub fn get_index(&mut self, obj: &JsObject, index: usize) -> JsResult<JsValue> {
        obj.get(index, &mut self.context)
    }

    pub fn to_text(&mut self, value: &JsValue) -> JsResult<String> {
        Ok(value.to_string(&mut self.context)?.to_std_string_escaped())
    }

    pub fn length(&mut self, obj: &JsObject) -> JsResult<u64> {
        obj.get(js_string!("length"), &mut self.context)?
            .to_length(&mut self.context)
    }

    /// Props serializadas a JSON; funciones, `children` y `ref` quedan fuera.
    pub fn props_to_json(&mut self, props: &JsValue) -> serde_json::Map<String, serde_json::Value> {
        let raw = self
            .props_json
            .call(&JsValue::undefined(), &[props.clone()], &mut self.context)
            .ok()
            .and_then(|v| v.as_string().map(|s| s.to_std_string_escaped()));

        match raw.as_deref().map(serde_json::from_str::<serde_json::Value>) {
            Some(Ok(serde_json::Value::Object(map))) => map,
            Some(Err(e)) => {
                warn!("Props no serializables en la previsualización: {}", e);
                serde_json::Map::new()
            }
            _ => serde_json::Map::new(),
        }
    }
}

fn classify(value: JsValue) -> Option<Entry> {
    if let Some(f) = value.as_callable() {
        return Some(Entry::Callable(f.clone()));
    }
    if value.is_object() {
        return Some(Entry::Element(value));
    }
    None
}

fn require_blocked(_this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    Err(JsError::from(
        JsNativeError::error().with_message("Imports are not supported in preview."),
    ))
}

pub const BUDGET_EXCEEDED: &str = "Execution time budget exceeded";

/// Registra el hook del presupuesto como global no escribible ni configurable.
fn install_budget(context: &mut Context, budget: Duration) -> JsResult<()> {
    let deadline = Instant::now() + budget;
    let hook = FunctionObjectBuilder::new(
        context.realm(),
        NativeFunction::from_copy_closure(move |_this, _args, _ctx| {
            if Instant::now() >= deadline {
                return Err(JsNativeError::error().with_message(BUDGET_EXCEEDED).into());
            }
            Ok(JsValue::undefined())
        }),
    )
    .name(js_string!("budget"))
    .length(0)
    .build();
    context.register_global_property(JsString::from(BUDGET_HOOK), hook, Attribute::empty())
}

fn join_args(args: &[JsValue]) -> String {
    args.iter()
        .map(|a| match a.as_string() {
            Some(s) => s.to_std_string_escaped(),
            None => a.display().to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn console_log(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    debug!(target: "sandbox::console", "{}", join_args(args));
    Ok(JsValue::undefined())
}

fn console_warn(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    warn!(target: "sandbox::console", "{}", join_args(args));
    Ok(JsValue::undefined())
}

fn install_console(context: &mut Context) -> JsResult<()> {
    let console = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(console_log), js_string!("log"), 0)
        .function(NativeFunction::from_fn_ptr(console_log), js_string!("info"), 0)
        .function(NativeFunction::from_fn_ptr(console_log), js_string!("debug"), 0)
        .function(NativeFunction::from_fn_ptr(console_warn), js_string!("warn"), 0)
        .function(NativeFunction::from_fn_ptr(console_warn), js_string!("error"), 0)
        .build();
    context.register_global_property(js_string!("console"), console, Attribute::all())
}
