//! Espacio de trabajo por sesión: lista ordenada de ítems (brief + código +
//! previsualización) gestionada por una única tarea.
//!
//! Todas las mutaciones pasan por la cola de comandos de la tarea, así que se
//! aplican en orden. Los trabajos largos (LLM, sandbox) se ejecutan fuera y
//! devuelven su resultado con un ticket; si el ítem cambió entretanto, el
//! resultado se descarta.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::brief::Brief;
use crate::models::NodeType;
use crate::preview::{ContainerSize, PreviewError, PreviewFrame, PreviewSlot, PreviewState};

const QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemKind {
    Component,
    Section,
}

impl ItemKind {
    pub fn from_node_type(node_type: &NodeType) -> Self {
        match node_type {
            NodeType::Frame | NodeType::Section => Self::Section,
            _ => Self::Component,
        }
    }
}

/// Ítem recién importado, todavía sin código.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub name: String,
    pub kind: ItemKind,
    pub node_id: String,
    pub brief: Option<Brief>,
}

#[derive(Debug)]
struct WorkspaceItem {
    id: u64,
    name: String,
    kind: ItemKind,
    node_id: String,
    brief: Option<Brief>,
    code: String,
    preview: PreviewSlot,
    /// Época de la generación vigente (0 = ninguna en curso).
    generation: u64,
}

/// Vista serializable de un ítem.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub index: usize,
    pub name: String,
    pub kind: ItemKind,
    pub node_id: String,
    pub has_brief: bool,
    pub code: String,
    pub generating: bool,
    pub preview: PreviewState,
}

/// Trabajo de previsualización pendiente para una versión concreta del código.
#[derive(Debug, Clone)]
pub struct PreviewTicket {
    pub index: usize,
    pub item_id: u64,
    pub version: u64,
    pub code: String,
    pub container: ContainerSize,
}

/// Permiso para una generación; `finish_generation` sólo aplica si sigue vigente.
#[derive(Debug, Clone)]
pub struct GenerationTicket {
    pub index: usize,
    pub item_id: u64,
    pub epoch: u64,
    pub brief: Brief,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Applied(Option<PreviewTicket>),
    Stale,
}

impl PartialEq for PreviewTicket {
    fn eq(&self, other: &Self) -> bool {
        self.item_id == other.item_id && self.version == other.version
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum WorkspaceError {
    #[error("No existe el ítem {0}")]
    NoSuchItem(usize),
    #[error("El ítem {0} no tiene brief (nodo no disponible en Figma)")]
    MissingBrief(usize),
    #[error("El espacio de trabajo ya no está disponible")]
    Closed,
}

enum Command {
    Replace {
        items: Vec<NewItem>,
        reply: oneshot::Sender<usize>,
    },
    List {
        reply: oneshot::Sender<Vec<ItemView>>,
    },
    Get {
        index: usize,
        reply: oneshot::Sender<Result<ItemView, WorkspaceError>>,
    },
    Brief {
        index: usize,
        reply: oneshot::Sender<Result<Option<Brief>, WorkspaceError>>,
    },
    SetCode {
        index: usize,
        code: String,
        reply: oneshot::Sender<Result<Option<PreviewTicket>, WorkspaceError>>,
    },
    BeginGeneration {
        index: usize,
        reply: oneshot::Sender<Result<GenerationTicket, WorkspaceError>>,
    },
    FinishGeneration {
        ticket: GenerationTicket,
        code: String,
        reply: oneshot::Sender<GenerationOutcome>,
    },
    AbortGeneration {
        ticket: GenerationTicket,
    },
    CompletePreview {
        ticket: PreviewTicket,
        result: Result<PreviewFrame, PreviewError>,
        reply: oneshot::Sender<bool>,
    },
    Resize {
        index: usize,
        container: ContainerSize,
        reply: oneshot::Sender<Result<PreviewState, WorkspaceError>>,
    },
}

#[derive(Default)]
struct Workspace {
    items: Vec<WorkspaceItem>,
    next_id: u64,
    next_epoch: u64,
}

impl Workspace {
    fn item(&self, index: usize) -> Result<&WorkspaceItem, WorkspaceError> {
        self.items.get(index).ok_or(WorkspaceError::NoSuchItem(index))
    }

    fn item_mut(&mut self, index: usize) -> Result<&mut WorkspaceItem, WorkspaceError> {
        self.items
            .get_mut(index)
            .ok_or(WorkspaceError::NoSuchItem(index))
    }

    /// Ítem por índice, pero sólo si sigue siendo el mismo (no reemplazado).
    fn live_item_mut(&mut self, index: usize, item_id: u64) -> Option<&mut WorkspaceItem> {
        self.items.get_mut(index).filter(|it| it.id == item_id)
    }

    fn view(index: usize, item: &WorkspaceItem) -> ItemView {
        ItemView {
            index,
            name: item.name.clone(),
            kind: item.kind,
            node_id: item.node_id.clone(),
            has_brief: item.brief.is_some(),
            code: item.code.clone(),
            generating: item.generation != 0,
            preview: item.preview.state().clone(),
        }
    }

    fn replace(&mut self, items: Vec<NewItem>) -> usize {
        self.items = items
            .into_iter()
            .map(|new| {
                self.next_id += 1;
                WorkspaceItem {
                    id: self.next_id,
                    name: new.name,
                    kind: new.kind,
                    node_id: new.node_id,
                    brief: new.brief,
                    code: String::new(),
                    preview: PreviewSlot::default(),
                    generation: 0,
                }
            })
            .collect();
        self.items.len()
    }

    fn set_code(item: &mut WorkspaceItem, index: usize, code: String) -> Option<PreviewTicket> {
        let version = item.preview.set_code(&code);
        item.code = code;
        version.map(|version| PreviewTicket {
            index,
            item_id: item.id,
            version,
            code: item.code.clone(),
            container: item.preview.container(),
        })
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Replace { items, reply } => {
                let _ = reply.send(self.replace(items));
            }
            Command::List { reply } => {
                let views = self
                    .items
                    .iter()
                    .enumerate()
                    .map(|(i, it)| Self::view(i, it))
                    .collect();
                let _ = reply.send(views);
            }
            Command::Get { index, reply } => {
                let _ = reply.send(self.item(index).map(|it| Self::view(index, it)));
            }
            Command::Brief { index, reply } => {
                let _ = reply.send(self.item(index).map(|it| it.brief.clone()));
            }
            Command::SetCode { index, code, reply } => {
                let result = self.item_mut(index).map(|item| {
                    // Una edición manual abandona cualquier generación en curso.
                    item.generation = 0;
                    Self::set_code(item, index, code)
                });
                let _ = reply.send(result);
            }
            Command::BeginGeneration { index, reply } => {
                self.next_epoch += 1;
                let epoch = self.next_epoch;
                let result = self.item_mut(index).and_then(|item| {
                    let brief = item
                        .brief
                        .clone()
                        .ok_or(WorkspaceError::MissingBrief(index))?;
                    item.generation = epoch;
                    Ok(GenerationTicket {
                        index,
                        item_id: item.id,
                        epoch,
                        brief,
                    })
                });
                let _ = reply.send(result);
            }
            Command::FinishGeneration {
                ticket,
                code,
                reply,
            } => {
                let outcome = match self.live_item_mut(ticket.index, ticket.item_id) {
                    Some(item) if item.generation == ticket.epoch => {
                        item.generation = 0;
                        GenerationOutcome::Applied(Self::set_code(item, ticket.index, code))
                    }
                    _ => {
                        debug!("Generación obsoleta descartada (época {})", ticket.epoch);
                        GenerationOutcome::Stale
                    }
                };
                let _ = reply.send(outcome);
            }
            Command::AbortGeneration { ticket } => {
                if let Some(item) = self.live_item_mut(ticket.index, ticket.item_id) {
                    if item.generation == ticket.epoch {
                        item.generation = 0;
                    }
                }
            }
            Command::CompletePreview {
                ticket,
                result,
                reply,
            } => {
                let applied = self
                    .live_item_mut(ticket.index, ticket.item_id)
                    .map(|item| item.preview.complete(ticket.version, result))
                    .unwrap_or(false);
                let _ = reply.send(applied);
            }
            Command::Resize {
                index,
                container,
                reply,
            } => {
                let result = self.item_mut(index).map(|item| {
                    item.preview.resize(container);
                    item.preview.state().clone()
                });
                let _ = reply.send(result);
            }
        }
    }
}

/// Manejador clonable del espacio de trabajo. La tarea termina cuando se
/// sueltan todos los manejadores.
#[derive(Clone, Debug)]
pub struct WorkspaceHandle {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Command")
    }
}

impl WorkspaceHandle {
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::channel::<Command>(QUEUE_CAPACITY);
        tokio::spawn(async move {
            let mut workspace = Workspace::default();
            while let Some(command) = rx.recv().await {
                workspace.handle(command);
            }
            debug!("Espacio de trabajo cerrado");
        });
        Self { tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, WorkspaceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| WorkspaceError::Closed)?;
        rx.await.map_err(|_| WorkspaceError::Closed)
    }

    /// Sustituye todos los ítems (una importación nueva descarta la anterior).
    pub async fn replace(&self, items: Vec<NewItem>) -> Result<usize, WorkspaceError> {
        let count = self.request(|reply| Command::Replace { items, reply }).await?;
        info!("Espacio de trabajo con {} ítems", count);
        Ok(count)
    }

    pub async fn list(&self) -> Result<Vec<ItemView>, WorkspaceError> {
        self.request(|reply| Command::List { reply }).await
    }

    pub async fn get(&self, index: usize) -> Result<ItemView, WorkspaceError> {
        self.request(|reply| Command::Get { index, reply }).await?
    }

    pub async fn brief(&self, index: usize) -> Result<Option<Brief>, WorkspaceError> {
        self.request(|reply| Command::Brief { index, reply }).await?
    }

    pub async fn set_code(
        &self,
        index: usize,
        code: String,
    ) -> Result<Option<PreviewTicket>, WorkspaceError> {
        self.request(|reply| Command::SetCode { index, code, reply })
            .await?
    }

    pub async fn begin_generation(&self, index: usize) -> Result<GenerationTicket, WorkspaceError> {
        self.request(|reply| Command::BeginGeneration { index, reply })
            .await?
    }

    pub async fn finish_generation(
        &self,
        ticket: GenerationTicket,
        code: String,
    ) -> Result<GenerationOutcome, WorkspaceError> {
        self.request(|reply| Command::FinishGeneration {
            ticket,
            code,
            reply,
        })
        .await
    }

    pub async fn abort_generation(&self, ticket: GenerationTicket) -> Result<(), WorkspaceError> {
        self.tx
            .send(Command::AbortGeneration { ticket })
            .await
            .map_err(|_| WorkspaceError::Closed)
    }

    pub async fn complete_preview(
        &self,
        ticket: PreviewTicket,
        result: Result<PreviewFrame, PreviewError>,
    ) -> Result<bool, WorkspaceError> {
        self.request(|reply| Command::CompletePreview {
            ticket,
            result,
            reply,
        })
        .await
    }

    pub async fn resize(
        &self,
        index: usize,
        container: ContainerSize,
    ) -> Result<PreviewState, WorkspaceError> {
        self.request(|reply| Command::Resize {
            index,
            container,
            reply,
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brief::build_brief;
    use crate::config::{CanvasSize, SandboxLimits};
    use crate::models::DesignNode;
    use crate::preview::preview_source;
    use serde_json::json;

    fn new_item(name: &str, with_brief: bool) -> NewItem {
        let node: DesignNode =
            serde_json::from_value(json!({"id": name, "name": name, "type": "COMPONENT"})).unwrap();
        NewItem {
            name: name.to_string(),
            kind: ItemKind::Component,
            node_id: name.to_string(),
            brief: with_brief.then(|| build_brief(&node)),
        }
    }

    fn render(ticket: &PreviewTicket) -> Result<PreviewFrame, PreviewError> {
        preview_source(
            &ticket.code,
            ticket.container,
            &SandboxLimits::default(),
            CanvasSize::default(),
        )
    }

    #[test]
    fn frames_and_sections_become_sections() {
        assert_eq!(ItemKind::from_node_type(&NodeType::Frame), ItemKind::Section);
        assert_eq!(ItemKind::from_node_type(&NodeType::Section), ItemKind::Section);
        assert_eq!(ItemKind::from_node_type(&NodeType::ComponentSet), ItemKind::Component);
    }

    #[tokio::test]
    async fn replace_and_list_keep_order() {
        let ws = WorkspaceHandle::spawn();
        let count = ws
            .replace(vec![new_item("a", true), new_item("b", false)])
            .await
            .unwrap();
        assert_eq!(count, 2);

        let items = ws.list().await.unwrap();
        assert_eq!(items[0].name, "a");
        assert!(items[0].has_brief);
        assert!(!items[1].has_brief);
        assert!(matches!(items[1].preview, PreviewState::Empty));
        assert_eq!(ws.get(5).await.unwrap_err(), WorkspaceError::NoSuchItem(5));
    }

    #[tokio::test]
    async fn code_edits_produce_preview_tickets() {
        let ws = WorkspaceHandle::spawn();
        ws.replace(vec![new_item("a", true)]).await.unwrap();

        let ticket = ws
            .set_code(0, "function A() { return React.createElement('p', null, 'a'); }".into())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(ws.get(0).await.unwrap().preview, PreviewState::Resolving));

        let result = render(&ticket);
        assert!(ws.complete_preview(ticket, result).await.unwrap());
        match ws.get(0).await.unwrap().preview {
            PreviewState::Rendered { frame } => assert_eq!(frame.entry_name, "A"),
            other => panic!("estado inesperado: {other:?}"),
        }

        assert!(ws.set_code(0, "  ".into()).await.unwrap().is_none());
        assert!(matches!(ws.get(0).await.unwrap().preview, PreviewState::Empty));
    }

    #[tokio::test]
    async fn stale_preview_results_are_ignored() {
        let ws = WorkspaceHandle::spawn();
        ws.replace(vec![new_item("a", true)]).await.unwrap();

        let old = ws.set_code(0, "function Old() { return null; }".into()).await.unwrap().unwrap();
        let new = ws.set_code(0, "function New() { return null; }".into()).await.unwrap().unwrap();

        let old_result = render(&old);
        assert!(!ws.complete_preview(old, old_result).await.unwrap());
        let new_result = render(&new);
        assert!(ws.complete_preview(new, new_result).await.unwrap());
    }

    #[tokio::test]
    async fn newer_generation_or_manual_edit_abandons_older_one() {
        let ws = WorkspaceHandle::spawn();
        ws.replace(vec![new_item("a", true)]).await.unwrap();

        let first = ws.begin_generation(0).await.unwrap();
        let second = ws.begin_generation(0).await.unwrap();
        assert!(ws.get(0).await.unwrap().generating);

        let stale = ws.finish_generation(first, "function X() {}".into()).await.unwrap();
        assert_eq!(stale, GenerationOutcome::Stale);

        let third = ws.begin_generation(0).await.unwrap();
        ws.set_code(0, "function Manual() {}".into()).await.unwrap();
        assert_eq!(
            ws.finish_generation(third, "function Y() {}".into()).await.unwrap(),
            GenerationOutcome::Stale
        );
        assert_eq!(ws.get(0).await.unwrap().code, "function Manual() {}");

        // La segunda ya fue superada por la tercera.
        assert_eq!(
            ws.finish_generation(second, "function Z() {}".into()).await.unwrap(),
            GenerationOutcome::Stale
        );
    }

    #[tokio::test]
    async fn generation_applies_code_when_current() {
        let ws = WorkspaceHandle::spawn();
        ws.replace(vec![new_item("a", true)]).await.unwrap();

        let ticket = ws.begin_generation(0).await.unwrap();
        assert_eq!(ticket.brief.id, "a");
        match ws.finish_generation(ticket, "function G() { return null; }".into()).await.unwrap() {
            GenerationOutcome::Applied(Some(preview)) => assert_eq!(preview.index, 0),
            other => panic!("resultado inesperado: {other:?}"),
        }
        let view = ws.get(0).await.unwrap();
        assert!(!view.generating);
        assert!(view.code.contains("function G"));
    }

    #[tokio::test]
    async fn reimport_invalidates_in_flight_work() {
        let ws = WorkspaceHandle::spawn();
        ws.replace(vec![new_item("a", true)]).await.unwrap();
        let generation = ws.begin_generation(0).await.unwrap();
        let preview = ws.set_code(0, "function A() { return null; }".into()).await.unwrap().unwrap();

        ws.replace(vec![new_item("b", true)]).await.unwrap();
        let result = render(&preview);
        assert!(!ws.complete_preview(preview, result).await.unwrap());
        assert_eq!(
            ws.finish_generation(generation, "x".into()).await.unwrap(),
            GenerationOutcome::Stale
        );
        assert_eq!(ws.get(0).await.unwrap().code, "");
    }

    #[tokio::test]
    async fn items_without_brief_cannot_be_generated() {
        let ws = WorkspaceHandle::spawn();
        ws.replace(vec![new_item("a", false)]).await.unwrap();
        assert_eq!(
            ws.begin_generation(0).await.unwrap_err(),
            WorkspaceError::MissingBrief(0)
        );
        assert!(!ws.get(0).await.unwrap().generating);
    }

    #[tokio::test]
    async fn resize_rescales_rendered_previews() {
        let ws = WorkspaceHandle::spawn();
        ws.replace(vec![new_item("a", true)]).await.unwrap();
        let ticket = ws.set_code(0, "function A() { return null; }".into()).await.unwrap().unwrap();
        let result = render(&ticket);
        ws.complete_preview(ticket, result).await.unwrap();

        let state = ws
            .resize(0, ContainerSize { width: 180.0, height: 4000.0 })
            .await
            .unwrap();
        match state {
            PreviewState::Rendered { frame } => assert!((frame.scale - 0.5).abs() < 1e-9),
            other => panic!("estado inesperado: {other:?}"),
        }
    }
}
