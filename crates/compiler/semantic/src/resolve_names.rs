//! # Name Resolution
//!
//! Builds the scope tree and symbol table and annotates every [`Name`] in
//! the tree with its symbol. Runs in two phases: unit names (and ENTRY
//! names) are bound first so calls may refer to units defined later in the
//! file, then each unit is resolved in order. Within a unit the
//! specification part is processed first, contained subprogram names are
//! pre-bound next, and the execution part is walked last, creating
//! implicitly typed objects for names with no declaration.

use chumsky::span::SimpleSpan;
use ferro_compiler_diagnostics::{Diagnostic, DiagnosticCode};
use ferro_compiler_parser::ast::{
    Block, CaseValue, CommonBlockDecl, Construct, DataObject, DataStmt, DerivedTypeDef, DimSpec,
    EntityDecl, ExecPart, Expr, LoopControl, Name, Program, ProgramUnit, Spanned, SpecStmt,
    Statement, Stmt, SymbolId, TypeDeclStmt, TypeSpec, UnitBody, Variable,
};
use smol_str::SmolStr;

use crate::context::SemanticsContext;
use crate::expr::{self, fold_constant, fold_int_expr};
use crate::mod_file;
use crate::scope::{EquivRef, ScopeId, ScopeKind};
use crate::symbol::{
    CommonBlockDetails, Initializer, ObjectDetails, SubprogramDetails, Symbol, SymbolDetails,
    SymbolFlags,
};
use crate::types::{self, ConstValue, Extent, TypeDesc};

/// Resolve all names in the program. Returns false when resolution
/// reported a fatal error.
pub fn resolve_names(ctx: &mut SemanticsContext, program: &mut Program) -> bool {
    let mut resolver = Resolver { ctx: &mut *ctx };
    for unit in &program.units {
        resolver.pre_bind_unit(crate::scope::GLOBAL_SCOPE, unit);
    }
    for unit in &mut program.units {
        resolver.resolve_unit(crate::scope::GLOBAL_SCOPE, unit);
    }
    !ctx.any_fatal_error()
}

struct Resolver<'a> {
    ctx: &'a mut SemanticsContext,
}

impl Resolver<'_> {
    // ===== Phase 1: unit names =====

    /// Bind a unit's name, and its ENTRY names, into `target` so references
    /// ahead of the definition resolve
    fn pre_bind_unit(&mut self, target: ScopeId, unit: &ProgramUnit) {
        match unit {
            ProgramUnit::Main(main) => {
                if let Some(name) = &main.name {
                    self.bind_unit_name(
                        target,
                        name,
                        SymbolDetails::MainProgram { scope: None },
                    );
                }
            }
            ProgramUnit::Function(function) => {
                self.bind_unit_name(
                    target,
                    &function.name,
                    SymbolDetails::Subprogram(SubprogramDetails {
                        is_function: true,
                        ..SubprogramDetails::default()
                    }),
                );
                self.pre_bind_entries(target, &function.body, true);
            }
            ProgramUnit::Subroutine(subroutine) => {
                self.bind_unit_name(
                    target,
                    &subroutine.name,
                    SymbolDetails::Subprogram(SubprogramDetails::default()),
                );
                self.pre_bind_entries(target, &subroutine.body, false);
            }
            ProgramUnit::Module(_) | ProgramUnit::BlockData(_) => {}
        }
    }

    fn pre_bind_entries(&mut self, target: ScopeId, body: &UnitBody, is_function: bool) {
        fn visit(resolver: &mut Resolver, target: ScopeId, stmt: &Statement<Stmt>, is_function: bool) {
            match &stmt.value {
                Stmt::Entry { name, .. } => {
                    resolver.bind_unit_name(
                        target,
                        name,
                        SymbolDetails::Subprogram(SubprogramDetails {
                            is_function,
                            is_entry: true,
                            ..SubprogramDetails::default()
                        }),
                    );
                }
                Stmt::IfStmt { action, .. } => visit(resolver, target, action, is_function),
                _ => {}
            }
        }
        fn walk(resolver: &mut Resolver, target: ScopeId, block: &Block, is_function: bool) {
            for part in block {
                match part {
                    ExecPart::Statement(stmt) => visit(resolver, target, stmt, is_function),
                    ExecPart::Construct(construct) => {
                        each_block(construct, &mut |inner| {
                            walk(resolver, target, inner, is_function);
                        });
                    }
                }
            }
        }
        walk(self, target, &body.execution, is_function);
    }

    fn bind_unit_name(&mut self, target: ScopeId, name: &Name, details: SymbolDetails) {
        if let Some(previous) = self.ctx.scope(target).find_symbol(name.as_str()) {
            let previous_span = self.ctx.symbol(previous).span;
            self.ctx.add_diagnostic(
                Diagnostic::error(
                    DiagnosticCode::DuplicateDeclaration,
                    format!("'{}' is already declared in this scope", name.as_str()),
                )
                .with_location(name.span)
                .with_related_span(previous_span, "Previous declaration".to_string()),
            );
            return;
        }
        let id = self
            .ctx
            .new_symbol(Symbol::new(name.text.clone(), target, name.span, details));
        self.ctx
            .scope_mut(target)
            .insert_symbol(name.text.clone(), id);
    }

    // ===== Phase 2: units =====

    fn resolve_unit(&mut self, parent: ScopeId, unit: &mut ProgramUnit) {
        match unit {
            ProgramUnit::Main(main) => {
                let scope = self.new_unit_scope(
                    parent,
                    ScopeKind::MainProgram,
                    main.name.as_ref(),
                    main.span,
                );
                if let Some(name) = &mut main.name {
                    if let Some(id) = self.annotate_unit_name(parent, name, scope) {
                        if let SymbolDetails::MainProgram { scope: link } =
                            &mut self.ctx.symbol_mut(id).details
                        {
                            *link = Some(scope);
                        }
                    }
                }
                self.resolve_body(scope, &mut main.body);
            }
            ProgramUnit::Function(function) => {
                let scope = self.new_unit_scope(
                    parent,
                    ScopeKind::Subprogram,
                    Some(&function.name),
                    function.span,
                );
                let unit_symbol = self.annotate_unit_name(parent, &mut function.name, scope);
                self.declare_dummies(scope, &mut function.dummy_args);
                let result_type = match &mut function.prefix {
                    Some(spec) => self.resolve_type_spec(scope, spec),
                    None => None,
                };
                let result_name = function.result.as_ref().unwrap_or(&function.name).clone();
                let result_id = self.declare_result(scope, &result_name, result_type);
                if let Some(name) = &mut function.result {
                    name.symbol = Some(result_id);
                }
                if let Some(id) = unit_symbol {
                    let dummy_ids = self.dummy_ids(scope, &function.dummy_args);
                    if let Some(details) = self.ctx.symbol_mut(id).subprogram_mut() {
                        details.scope = Some(scope);
                        details.result = Some(result_id);
                        details.dummy_args = dummy_ids;
                    }
                }
                self.resolve_body(scope, &mut function.body);
            }
            ProgramUnit::Subroutine(subroutine) => {
                let scope = self.new_unit_scope(
                    parent,
                    ScopeKind::Subprogram,
                    Some(&subroutine.name),
                    subroutine.span,
                );
                let unit_symbol = self.annotate_unit_name(parent, &mut subroutine.name, scope);
                self.declare_dummies(scope, &mut subroutine.dummy_args);
                if let Some(id) = unit_symbol {
                    let dummy_ids = self.dummy_ids(scope, &subroutine.dummy_args);
                    if let Some(details) = self.ctx.symbol_mut(id).subprogram_mut() {
                        details.scope = Some(scope);
                        details.dummy_args = dummy_ids;
                    }
                }
                self.resolve_body(scope, &mut subroutine.body);
            }
            ProgramUnit::Module(module) => {
                let scope = self.new_unit_scope(
                    parent,
                    ScopeKind::Module,
                    Some(&module.name),
                    module.span,
                );
                self.bind_unit_name(parent, &module.name, SymbolDetails::Module { scope });
                module.name.symbol = self.ctx.scope(parent).find_symbol(module.name.as_str());
                self.ctx.scope_mut(scope).symbol = module.name.symbol;
                for spec in &mut module.specs {
                    self.resolve_spec(scope, spec);
                }
                for contained in &module.contains {
                    self.pre_bind_unit(scope, contained);
                }
                for contained in &mut module.contains {
                    self.resolve_unit(scope, contained);
                }
                self.ctx
                    .register_compiled_module(module.name.text.clone(), scope);
            }
            ProgramUnit::BlockData(block_data) => {
                let scope = self.new_unit_scope(
                    parent,
                    ScopeKind::BlockData,
                    block_data.name.as_ref(),
                    block_data.span,
                );
                if let Some(name) = &mut block_data.name {
                    self.bind_unit_name(parent, name, SymbolDetails::BlockData { scope });
                    name.symbol = self.ctx.scope(parent).find_symbol(name.as_str());
                    self.ctx.scope_mut(scope).symbol = name.symbol;
                }
                for spec in &mut block_data.specs {
                    self.resolve_spec(scope, spec);
                }
            }
        }
    }

    fn new_unit_scope(
        &mut self,
        parent: ScopeId,
        kind: ScopeKind,
        name: Option<&Name>,
        span: SimpleSpan<usize>,
    ) -> ScopeId {
        let scope_name = name.map_or_else(SmolStr::default, |n| n.text.clone());
        let scope = self.ctx.scopes.push_scope(kind, parent, scope_name);
        self.ctx.extend_scope_range(scope, span.start, span.end);
        scope
    }

    /// Point the unit scope and the unit name at the pre-bound symbol
    fn annotate_unit_name(
        &mut self,
        parent: ScopeId,
        name: &mut Name,
        scope: ScopeId,
    ) -> Option<SymbolId> {
        let id = self.ctx.scope(parent).find_symbol(name.as_str())?;
        name.symbol = Some(id);
        self.ctx.scope_mut(scope).symbol = Some(id);
        Some(id)
    }

    /// Declare dummy arguments in the unit scope. ENTRY dummies may name
    /// variables that are already declared; those just gain the flag.
    fn declare_dummies(&mut self, scope: ScopeId, dummy_args: &mut [Name]) {
        for arg in dummy_args {
            let id = match self.ctx.scope(scope).find_symbol(arg.as_str()) {
                Some(id) => {
                    self.ctx.symbol_mut(id).flags |= SymbolFlags::DUMMY;
                    id
                }
                None => {
                    let id = self.ctx.new_symbol(
                        Symbol::new(
                            arg.text.clone(),
                            scope,
                            arg.span,
                            SymbolDetails::Object(ObjectDetails::default()),
                        )
                        .with_flags(SymbolFlags::DUMMY),
                    );
                    self.ctx.scope_mut(scope).insert_symbol(arg.text.clone(), id);
                    id
                }
            };
            arg.symbol = Some(id);
        }
    }

    fn dummy_ids(&self, scope: ScopeId, dummy_args: &[Name]) -> Vec<SymbolId> {
        dummy_args
            .iter()
            .filter_map(|arg| self.ctx.scope(scope).find_symbol(arg.as_str()))
            .collect()
    }

    fn declare_result(
        &mut self,
        scope: ScopeId,
        name: &Name,
        decl_type: Option<TypeDesc>,
    ) -> SymbolId {
        let id = self.ctx.new_symbol(
            Symbol::new(
                name.text.clone(),
                scope,
                name.span,
                SymbolDetails::Object(ObjectDetails {
                    decl_type,
                    ..ObjectDetails::default()
                }),
            )
            .with_flags(SymbolFlags::FUNCTION_RESULT),
        );
        self.ctx.scope_mut(scope).insert_symbol(name.text.clone(), id);
        id
    }

    fn resolve_body(&mut self, scope: ScopeId, body: &mut UnitBody) {
        for spec in &mut body.specs {
            self.resolve_spec(scope, spec);
        }
        for contained in &body.contains {
            self.pre_bind_unit(scope, contained);
        }
        self.resolve_block(scope, &mut body.execution);
        for contained in &mut body.contains {
            self.resolve_unit(scope, contained);
        }
    }

    // ===== Specification statements =====

    fn resolve_spec(&mut self, scope: ScopeId, spec: &mut Statement<SpecStmt>) {
        self.ctx.set_location(spec.span);
        match &mut spec.value {
            SpecStmt::TypeDecl(decl) => self.resolve_type_decl(scope, scope, decl),
            SpecStmt::DerivedTypeDef(def) => self.resolve_derived_type(scope, def),
            SpecStmt::Parameter { pairs } => {
                for (name, value) in pairs {
                    self.resolve_parameter(scope, name, value);
                }
            }
            SpecStmt::Common { blocks } => {
                for block in blocks {
                    self.resolve_common_decl(scope, block);
                }
            }
            SpecStmt::Equivalence { sets } => {
                for set in sets {
                    let mut refs = Vec::with_capacity(set.len());
                    for object in set.iter_mut() {
                        let Some(id) = self.resolve_decl_name(scope, &mut object.name) else {
                            continue;
                        };
                        self.ctx.symbol_mut(id).flags |= SymbolFlags::EQUIVALENCED;
                        let mut subscripts = Vec::new();
                        if let Some(exprs) = &mut object.subscripts {
                            for subscript in exprs.iter_mut() {
                                self.resolve_expr(scope, subscript);
                                match fold_int_expr(self.ctx, scope, subscript) {
                                    Some(value) => subscripts.push(value),
                                    None => self.ctx.error(
                                        DiagnosticCode::NonConstantExpression,
                                        "EQUIVALENCE subscript must be a constant expression"
                                            .to_string(),
                                        subscript.span(),
                                    ),
                                }
                            }
                        }
                        refs.push(EquivRef {
                            symbol: id,
                            subscripts,
                            span: object.name.span,
                        });
                    }
                    self.ctx.scope_mut(scope).equivalence_sets.push(refs);
                }
            }
            SpecStmt::Data(data) => self.resolve_data(scope, data),
            SpecStmt::ImplicitNone => self.ctx.scope_mut(scope).implicit_none = true,
            SpecStmt::Use { module } => self.resolve_use(scope, module),
        }
        self.ctx.clear_location();
    }

    fn resolve_type_decl(
        &mut self,
        decl_scope: ScopeId,
        lookup_scope: ScopeId,
        decl: &mut TypeDeclStmt,
    ) {
        let base_type = self.resolve_type_spec(lookup_scope, &mut decl.type_spec);
        for entity in &mut decl.entities {
            self.declare_entity(decl_scope, lookup_scope, entity, base_type, decl.parameter);
        }
    }

    fn declare_entity(
        &mut self,
        decl_scope: ScopeId,
        lookup_scope: ScopeId,
        entity: &mut EntityDecl,
        base_type: Option<TypeDesc>,
        parameter: bool,
    ) {
        let name = &entity.name;
        let id = match self.ctx.scope(decl_scope).find_symbol(name.as_str()) {
            // a local declaration shadows a use-associated name
            Some(id)
                if matches!(self.ctx.symbol(id).details, SymbolDetails::Use { .. })
                    && self.ctx.symbol(id).owner == decl_scope =>
            {
                let id = self.ctx.new_symbol(Symbol::new(
                    name.text.clone(),
                    decl_scope,
                    name.span,
                    SymbolDetails::Object(ObjectDetails {
                        decl_type: base_type,
                        ..ObjectDetails::default()
                    }),
                ));
                self.ctx
                    .scope_mut(decl_scope)
                    .insert_symbol(name.text.clone(), id);
                id
            }
            Some(id) => {
                let untyped = self
                    .ctx
                    .symbol(id)
                    .object()
                    .is_some_and(|object| object.decl_type.is_none());
                if untyped {
                    if let Some(object) = self.ctx.symbol_mut(id).object_mut() {
                        object.decl_type = base_type;
                    }
                    id
                } else {
                    let previous_span = self.ctx.symbol(id).span;
                    self.ctx.add_diagnostic(
                        Diagnostic::error(
                            DiagnosticCode::ConflictingDeclaration,
                            format!("The type of '{}' has already been declared", name.as_str()),
                        )
                        .with_location(name.span)
                        .with_related_span(previous_span, "Previous declaration".to_string()),
                    );
                    entity.name.symbol = Some(id);
                    return;
                }
            }
            None => {
                let id = self.ctx.new_symbol(Symbol::new(
                    name.text.clone(),
                    decl_scope,
                    name.span,
                    SymbolDetails::Object(ObjectDetails {
                        decl_type: base_type,
                        ..ObjectDetails::default()
                    }),
                ));
                self.ctx
                    .scope_mut(decl_scope)
                    .insert_symbol(name.text.clone(), id);
                id
            }
        };
        entity.name.symbol = Some(id);

        if let Some(dims) = &mut entity.array_spec {
            let shape = self.resolve_shape(lookup_scope, dims, id);
            if let Some(object) = self.ctx.symbol_mut(id).object_mut() {
                object.shape = shape;
            }
        }

        if parameter {
            self.ctx.symbol_mut(id).flags |= SymbolFlags::PARAMETER;
        }
        match &mut entity.init {
            Some(init) => {
                self.resolve_expr(lookup_scope, init);
                let folded = fold_constant(self.ctx, lookup_scope, init);
                match folded {
                    Some(value) => {
                        let converted = self.convert_initializer(id, value, init.span());
                        let symbol = self.ctx.symbol_mut(id);
                        if parameter {
                            if let Some(object) = symbol.object_mut() {
                                object.value = converted;
                            }
                        } else {
                            symbol.flags |= SymbolFlags::DATA_INIT;
                            if let Some(object) = symbol.object_mut() {
                                object.init = converted.map(Initializer::Scalar);
                            }
                        }
                        self.ctx.note_defined(id);
                    }
                    None => {
                        self.ctx.error(
                            DiagnosticCode::NonConstantExpression,
                            format!(
                                "Initializer for '{}' must be a constant expression",
                                self.ctx.symbol(id).name
                            ),
                            init.span(),
                        );
                        self.ctx.set_error(id);
                    }
                }
            }
            None if parameter => {
                self.ctx.error(
                    DiagnosticCode::ParameterWithoutValue,
                    format!("Named constant '{}' must have a value", entity.name.as_str()),
                    entity.name.span,
                );
                self.ctx.set_error(id);
            }
            None => {}
        }
    }

    /// Coerce a folded initializer to the declared type. Mixed numeric
    /// kinds convert; anything else is a type error.
    fn convert_initializer(
        &mut self,
        id: SymbolId,
        value: ConstValue,
        span: SimpleSpan<usize>,
    ) -> Option<ConstValue> {
        let Some(decl_type) = self.ctx.symbol(id).type_desc().copied() else {
            return Some(value);
        };
        let converted = types::convert_constant(value, &decl_type);
        if converted.is_none() {
            let name = self.ctx.symbol(id).name.clone();
            self.ctx.error(
                DiagnosticCode::TypeMismatch,
                format!("Initialization value for '{name}' has the wrong type"),
                span,
            );
            self.ctx.set_error(id);
        }
        converted
    }

    fn resolve_shape(
        &mut self,
        lookup_scope: ScopeId,
        dims: &mut [DimSpec],
        id: SymbolId,
    ) -> Vec<Extent> {
        let is_dummy = self.ctx.symbol(id).flags.contains(SymbolFlags::DUMMY);
        let mut shape = Vec::with_capacity(dims.len());
        for dim in dims {
            let lower = match &mut dim.lower {
                Some(expr) => {
                    self.resolve_expr(lookup_scope, expr);
                    self.fold_bound(lookup_scope, expr, is_dummy)
                }
                None => Some(1),
            };
            self.resolve_expr(lookup_scope, &mut dim.upper);
            let upper = self.fold_bound(lookup_scope, &mut dim.upper, is_dummy);
            match (lower, upper) {
                (Some(lower), Some(upper)) => shape.push(Extent { lower, upper }),
                // adjustable dummy extent, sized by the caller
                _ => shape.push(Extent { lower: 1, upper: 1 }),
            }
        }
        shape
    }

    fn fold_bound(
        &mut self,
        scope: ScopeId,
        expr: &mut Spanned<Expr>,
        is_dummy: bool,
    ) -> Option<i64> {
        match fold_int_expr(self.ctx, scope, expr) {
            Some(value) => Some(value),
            None if is_dummy => None,
            None => {
                self.ctx.error(
                    DiagnosticCode::NonConstantExpression,
                    "Array bound must be a constant expression".to_string(),
                    expr.span(),
                );
                None
            }
        }
    }

    fn resolve_type_spec(&mut self, scope: ScopeId, spec: &mut TypeSpec) -> Option<TypeDesc> {
        match spec {
            TypeSpec::Integer { kind } => {
                let kind = self.fold_kind(scope, kind, self.ctx.default_kinds.integer, "INTEGER");
                Some(TypeDesc::Integer { kind })
            }
            TypeSpec::Real { kind } => {
                let kind = self.fold_kind(scope, kind, self.ctx.default_kinds.real, "REAL");
                Some(TypeDesc::Real { kind })
            }
            TypeSpec::Logical { kind } => {
                let kind = self.fold_kind(scope, kind, self.ctx.default_kinds.logical, "LOGICAL");
                Some(TypeDesc::Logical { kind })
            }
            TypeSpec::Character { len } => {
                let len = match len {
                    Some(expr) => {
                        self.resolve_expr(scope, expr);
                        match fold_int_expr(self.ctx, scope, expr) {
                            Some(value) => u32::try_from(value.max(0)).unwrap_or(0),
                            None => {
                                self.ctx.error(
                                    DiagnosticCode::NonConstantExpression,
                                    "Character length must be a constant expression".to_string(),
                                    expr.span(),
                                );
                                1
                            }
                        }
                    }
                    None => 1,
                };
                Some(TypeDesc::Character { len })
            }
            TypeSpec::Derived(name) => {
                let Some(id) = self.lookup(scope, name.as_str()) else {
                    self.ctx.error(
                        DiagnosticCode::UndeclaredName,
                        format!("Derived type '{}' not found", name.as_str()),
                        name.span,
                    );
                    return None;
                };
                name.symbol = Some(id);
                let ultimate = self.ctx.ultimate(id);
                if matches!(
                    self.ctx.symbol(ultimate).details,
                    SymbolDetails::DerivedType { .. }
                ) {
                    Some(TypeDesc::Derived(ultimate))
                } else {
                    self.ctx.error(
                        DiagnosticCode::ConflictingDeclaration,
                        format!("'{}' is not a derived type", name.as_str()),
                        name.span,
                    );
                    None
                }
            }
        }
    }

    fn fold_kind(
        &mut self,
        scope: ScopeId,
        kind: &mut Option<Spanned<Expr>>,
        default: u8,
        type_name: &str,
    ) -> u8 {
        let Some(expr) = kind else {
            return default;
        };
        self.resolve_expr(scope, expr);
        let Some(value) = fold_int_expr(self.ctx, scope, expr) else {
            self.ctx.error(
                DiagnosticCode::NonConstantExpression,
                "Kind must be a constant expression".to_string(),
                expr.span(),
            );
            return default;
        };
        let supported = match type_name {
            "REAL" => matches!(value, 4 | 8),
            _ => matches!(value, 1 | 2 | 4 | 8),
        };
        if supported {
            value as u8
        } else {
            self.ctx.error(
                DiagnosticCode::InvalidKind,
                format!("KIND {value} is not supported for {type_name}"),
                expr.span(),
            );
            default
        }
    }

    fn resolve_parameter(
        &mut self,
        scope: ScopeId,
        name: &mut Name,
        value: &mut Spanned<Expr>,
    ) {
        self.resolve_expr(scope, value);
        let folded = fold_constant(self.ctx, scope, value);
        let Some(id) = self.resolve_decl_name(scope, name) else {
            return;
        };
        if self.ctx.symbol(id).is_named_constant() {
            let previous_span = self.ctx.symbol(id).span;
            self.ctx.add_diagnostic(
                Diagnostic::error(
                    DiagnosticCode::DuplicateDeclaration,
                    format!("'{}' is already a named constant", name.as_str()),
                )
                .with_location(name.span)
                .with_related_span(previous_span, "Previous definition".to_string()),
            );
            return;
        }
        self.ctx.symbol_mut(id).flags |= SymbolFlags::PARAMETER;
        match folded {
            Some(folded) => {
                let converted = self.convert_initializer(id, folded, value.span());
                if let Some(object) = self.ctx.symbol_mut(id).object_mut() {
                    object.value = converted;
                }
                self.ctx.note_defined(id);
            }
            None => {
                self.ctx.error(
                    DiagnosticCode::NonConstantExpression,
                    format!(
                        "Value of named constant '{}' must be a constant expression",
                        name.as_str()
                    ),
                    value.span(),
                );
                self.ctx.set_error(id);
            }
        }
    }

    fn resolve_common_decl(&mut self, scope: ScopeId, decl: &mut CommonBlockDecl) {
        let key = decl
            .name
            .as_ref()
            .map_or_else(SmolStr::default, |n| n.text.clone());
        let block_id = match self.ctx.scope(scope).common_blocks.get(&key) {
            Some(id) => *id,
            None => {
                let id = self.ctx.new_symbol(Symbol::new(
                    key.clone(),
                    scope,
                    decl.span,
                    SymbolDetails::CommonBlock(CommonBlockDetails::default()),
                ));
                self.ctx.scope_mut(scope).common_blocks.insert(key, id);
                id
            }
        };
        if let Some(name) = &mut decl.name {
            name.symbol = Some(block_id);
        }
        for object in &mut decl.objects {
            let Some(id) = self.resolve_decl_name(scope, &mut object.name) else {
                continue;
            };
            if let Some(dims) = &mut object.array_spec {
                let shape = self.resolve_shape(scope, dims, id);
                if let Some(details) = self.ctx.symbol_mut(id).object_mut() {
                    details.shape = shape;
                }
            }
            match self.ctx.symbol(id).object() {
                Some(details) if details.common.is_some() => {
                    self.ctx.error(
                        DiagnosticCode::InvalidCommonObject,
                        format!("'{}' is already in a COMMON block", object.name.as_str()),
                        object.name.span,
                    );
                }
                Some(_) => {
                    if let Some(details) = self.ctx.symbol_mut(id).object_mut() {
                        details.common = Some(block_id);
                    }
                    if let Some(block) = self.ctx.symbol_mut(block_id).common_block_mut() {
                        block.objects.push(id);
                    }
                }
                None => {
                    self.ctx.error(
                        DiagnosticCode::InvalidCommonObject,
                        format!("'{}' may not appear in COMMON", object.name.as_str()),
                        object.name.span,
                    );
                }
            }
        }
    }

    fn resolve_derived_type(&mut self, scope: ScopeId, def: &mut DerivedTypeDef) {
        let type_scope = self
            .ctx
            .scopes
            .push_scope(ScopeKind::DerivedType, scope, def.name.text.clone());
        if let Some(previous) = self.ctx.scope(scope).find_symbol(def.name.as_str()) {
            let previous_span = self.ctx.symbol(previous).span;
            self.ctx.add_diagnostic(
                Diagnostic::error(
                    DiagnosticCode::DuplicateDeclaration,
                    format!("'{}' is already declared in this scope", def.name.as_str()),
                )
                .with_location(def.name.span)
                .with_related_span(previous_span, "Previous declaration".to_string()),
            );
            return;
        }
        let id = self.ctx.new_symbol(Symbol::new(
            def.name.text.clone(),
            scope,
            def.name.span,
            SymbolDetails::DerivedType { scope: type_scope },
        ));
        self.ctx
            .scope_mut(scope)
            .insert_symbol(def.name.text.clone(), id);
        def.name.symbol = Some(id);
        self.ctx.scope_mut(type_scope).symbol = Some(id);
        for component in &mut def.components {
            self.resolve_type_decl(type_scope, scope, &mut component.value);
        }
    }

    fn resolve_use(&mut self, scope: ScopeId, module: &mut Name) {
        // require_module reports its own failures, against the USE site
        let Some(module_scope) =
            mod_file::require_module(self.ctx, module.as_str(), module.span)
        else {
            return;
        };
        if let Some(symbol) = self.ctx.scope(module_scope).symbol {
            module.symbol = Some(symbol);
        }
        let exported: Vec<(SmolStr, SymbolId)> = self
            .ctx
            .scope(module_scope)
            .symbols()
            .map(|(name, id)| (name.clone(), id))
            .collect();
        let span = module.span;
        for (name, target) in exported {
            if self.ctx.scope(scope).find_symbol(&name).is_some() {
                continue;
            }
            let alias = self.ctx.new_symbol(Symbol::new(
                name.clone(),
                scope,
                span,
                SymbolDetails::Use { target },
            ));
            self.ctx.scope_mut(scope).insert_symbol(name, alias);
        }
    }

    fn resolve_data(&mut self, scope: ScopeId, data: &mut DataStmt) {
        for set in &mut data.sets {
            for object in &mut set.objects {
                self.resolve_data_object(scope, object);
            }
            for value in &mut set.values {
                if let Some(repeat) = &mut value.repeat {
                    self.resolve_expr(scope, repeat);
                }
                self.resolve_expr(scope, &mut value.value);
            }
        }
        self.ctx.defer_initialization(scope, data.clone());
    }

    fn resolve_data_object(&mut self, scope: ScopeId, object: &mut DataObject) {
        match object {
            DataObject::Variable(variable) => {
                if let Some(id) = self.resolve_decl_name(scope, &mut variable.name) {
                    self.ctx.symbol_mut(id).flags |= SymbolFlags::DATA_INIT;
                    self.ctx.note_defined(id);
                }
                if let Some(subscripts) = &mut variable.subscripts {
                    for subscript in subscripts {
                        self.resolve_expr(scope, subscript);
                    }
                }
            }
            DataObject::ImpliedDo(implied) => {
                for nested in &mut implied.objects {
                    self.resolve_data_object(scope, nested);
                }
                self.resolve_decl_name(scope, &mut implied.var);
                self.resolve_expr(scope, &mut implied.lower);
                self.resolve_expr(scope, &mut implied.upper);
                if let Some(step) = &mut implied.step {
                    self.resolve_expr(scope, step);
                }
            }
        }
    }

    // ===== Name lookup =====

    fn lookup(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        self.ctx.scopes.find_symbol_from(scope, name)
    }

    /// Whether any enclosing scope has IMPLICIT NONE in force
    fn implicit_none(&self, scope: ScopeId) -> bool {
        self.ctx
            .scopes
            .ancestors(scope)
            .any(|id| self.ctx.scope(id).implicit_none)
    }

    fn implicit_type(&self, name: &str) -> TypeDesc {
        match name.chars().next() {
            Some('i'..='n') => TypeDesc::default_integer(&self.ctx.default_kinds),
            _ => TypeDesc::default_real(&self.ctx.default_kinds),
        }
    }

    /// Resolve a name in a declarative position, creating an implicitly
    /// typed object when it is unknown. Does not mark the symbol used.
    fn resolve_decl_name(&mut self, scope: ScopeId, name: &mut Name) -> Option<SymbolId> {
        if let Some(id) = name.symbol {
            return Some(id);
        }
        if let Some(id) = self.lookup(scope, name.as_str()) {
            name.symbol = Some(id);
            return Some(id);
        }
        let id = self.create_implicit_object(scope, name)?;
        name.symbol = Some(id);
        Some(id)
    }

    /// Resolve a name referenced by executable code
    fn resolve_ref_name(&mut self, scope: ScopeId, name: &mut Name) -> Option<SymbolId> {
        let id = self.resolve_decl_name(scope, name)?;
        self.ctx.symbol_mut(id).flags |= SymbolFlags::USED;
        Some(id)
    }

    fn create_implicit_object(&mut self, scope: ScopeId, name: &mut Name) -> Option<SymbolId> {
        if self.implicit_none(scope) {
            self.ctx.error(
                DiagnosticCode::UndeclaredName,
                format!("No explicit type declared for '{}'", name.as_str()),
                name.span,
            );
            let id = self.ctx.new_symbol(
                Symbol::new(
                    name.text.clone(),
                    scope,
                    name.span,
                    SymbolDetails::Object(ObjectDetails::default()),
                )
                .with_flags(SymbolFlags::IMPLICIT),
            );
            self.ctx.scope_mut(scope).insert_symbol(name.text.clone(), id);
            self.ctx.set_error(id);
            return Some(id);
        }
        let decl_type = Some(self.implicit_type(name.as_str()));
        let id = self.ctx.new_symbol(
            Symbol::new(
                name.text.clone(),
                scope,
                name.span,
                SymbolDetails::Object(ObjectDetails {
                    decl_type,
                    ..ObjectDetails::default()
                }),
            )
            .with_flags(SymbolFlags::IMPLICIT),
        );
        self.ctx.scope_mut(scope).insert_symbol(name.text.clone(), id);
        Some(id)
    }

    // ===== Execution part =====

    fn resolve_block(&mut self, scope: ScopeId, block: &mut Block) {
        for part in block {
            match part {
                ExecPart::Statement(stmt) => self.resolve_stmt(scope, stmt),
                ExecPart::Construct(construct) => self.resolve_construct(scope, construct),
            }
        }
    }

    fn resolve_stmt(&mut self, scope: ScopeId, stmt: &mut Statement<Stmt>) {
        self.ctx.set_location(stmt.span);
        let span = stmt.span;
        match &mut stmt.value {
            Stmt::Assignment { target, value } => {
                self.resolve_variable(scope, target);
                self.resolve_expr(scope, value);
            }
            Stmt::IfStmt { cond, action } => {
                self.resolve_expr(scope, cond);
                self.resolve_stmt(scope, action);
            }
            Stmt::ArithIf { expr, .. } => self.resolve_expr(scope, expr),
            Stmt::Goto(_) | Stmt::Return | Stmt::Continue | Stmt::Cycle | Stmt::Exit => {}
            Stmt::AssignLabel { var, .. } | Stmt::AssignedGoto { var, .. } => {
                self.resolve_ref_name(scope, var);
            }
            Stmt::Call { name, args } => {
                self.resolve_call_name(scope, name);
                for arg in args {
                    self.resolve_expr(scope, arg);
                }
            }
            Stmt::Stop { code } => {
                if let Some(code) = code {
                    self.resolve_expr(scope, code);
                }
            }
            Stmt::Print { items } => {
                for item in items {
                    self.resolve_expr(scope, item);
                }
            }
            Stmt::Entry {
                name,
                dummy_args,
                result,
            } => self.resolve_entry(scope, span, name, dummy_args, result.as_mut()),
            Stmt::ForallStmt {
                headers,
                mask,
                target,
                value,
            } => {
                for header in headers {
                    self.resolve_ref_name(scope, &mut header.var);
                    self.resolve_expr(scope, &mut header.lower);
                    self.resolve_expr(scope, &mut header.upper);
                    if let Some(step) = &mut header.step {
                        self.resolve_expr(scope, step);
                    }
                }
                if let Some(mask) = mask {
                    self.resolve_expr(scope, mask);
                }
                self.resolve_variable(scope, target);
                self.resolve_expr(scope, value);
            }
            Stmt::LabelDo { control, .. } => {
                // survives canonicalization only in malformed trees
                if let Some(control) = control {
                    self.resolve_loop_control(scope, control);
                }
            }
            Stmt::Directive(_) => {}
            Stmt::Data(data) => self.resolve_data(scope, data),
        }
        self.ctx.clear_location();
    }

    fn resolve_construct(&mut self, scope: ScopeId, construct: &mut Construct) {
        match construct {
            Construct::If(c) => {
                for arm in &mut c.arms {
                    self.resolve_expr(scope, &mut arm.cond);
                    self.resolve_block(scope, &mut arm.block);
                }
                if let Some(else_block) = &mut c.else_block {
                    self.resolve_block(scope, else_block);
                }
            }
            Construct::Do(c) => {
                if let Some(control) = &mut c.control {
                    self.resolve_loop_control(scope, control);
                }
                self.resolve_block(scope, &mut c.body);
            }
            Construct::Forall(c) => {
                for header in &mut c.headers {
                    self.resolve_ref_name(scope, &mut header.var);
                    self.resolve_expr(scope, &mut header.lower);
                    self.resolve_expr(scope, &mut header.upper);
                    if let Some(step) = &mut header.step {
                        self.resolve_expr(scope, step);
                    }
                }
                if let Some(mask) = &mut c.mask {
                    self.resolve_expr(scope, mask);
                }
                self.resolve_block(scope, &mut c.body);
            }
            Construct::Case(c) => {
                self.resolve_expr(scope, &mut c.selector);
                for arm in &mut c.arms {
                    if let Some(values) = &mut arm.values {
                        for value in values {
                            match value {
                                CaseValue::Single(expr) => self.resolve_expr(scope, expr),
                                CaseValue::Range(lower, upper) => {
                                    if let Some(lower) = lower {
                                        self.resolve_expr(scope, lower);
                                    }
                                    if let Some(upper) = upper {
                                        self.resolve_expr(scope, upper);
                                    }
                                }
                            }
                        }
                    }
                    self.resolve_block(scope, &mut arm.block);
                }
            }
            Construct::Parallel(c) => self.resolve_block(scope, &mut c.body),
            Construct::Offload(c) => self.resolve_block(scope, &mut c.body),
            Construct::Simd(c) => self.resolve_block(scope, &mut c.body),
        }
    }

    fn resolve_loop_control(&mut self, scope: ScopeId, control: &mut LoopControl) {
        match control {
            LoopControl::Counted {
                var,
                lower,
                upper,
                step,
            } => {
                self.resolve_ref_name(scope, var);
                self.resolve_expr(scope, lower);
                self.resolve_expr(scope, upper);
                if let Some(step) = step {
                    self.resolve_expr(scope, step);
                }
            }
            LoopControl::While(cond) => self.resolve_expr(scope, cond),
        }
    }

    fn resolve_variable(&mut self, scope: ScopeId, variable: &mut Variable) {
        self.resolve_ref_name(scope, &mut variable.name);
        if let Some(subscripts) = &mut variable.subscripts {
            for subscript in subscripts {
                self.resolve_expr(scope, subscript);
            }
        }
    }

    fn resolve_expr(&mut self, scope: ScopeId, expr: &mut Spanned<Expr>) {
        match expr.value_mut() {
            Expr::IntLiteral(_)
            | Expr::RealLiteral(_)
            | Expr::LogicalLiteral(_)
            | Expr::CharLiteral(_) => {}
            Expr::Named(name) => {
                self.resolve_ref_name(scope, name);
            }
            Expr::FunctionRef { name, args } => {
                self.resolve_function_name(scope, name);
                for arg in args {
                    self.resolve_expr(scope, arg);
                }
            }
            Expr::ArrayElement { name, subscripts } => {
                self.resolve_ref_name(scope, name);
                for subscript in subscripts {
                    self.resolve_expr(scope, subscript);
                }
            }
            Expr::Unary { operand, .. } => self.resolve_expr(scope, operand),
            Expr::Binary { lhs, rhs, .. } => {
                self.resolve_expr(scope, lhs);
                self.resolve_expr(scope, rhs);
            }
            Expr::Paren(inner) => self.resolve_expr(scope, inner),
        }
    }

    /// Resolve a name referenced with an argument list. Unknown names
    /// become intrinsics or implicit external functions; a scalar object
    /// owned by this unit that was never used as data becomes an external
    /// function of that type.
    fn resolve_function_name(&mut self, scope: ScopeId, name: &mut Name) {
        if name.symbol.is_none() {
            if let Some(id) = self.lookup(scope, name.as_str()) {
                name.symbol = Some(id);
            }
        }
        match name.symbol {
            Some(id) => {
                self.ctx.symbol_mut(id).flags |= SymbolFlags::USED;
                self.maybe_morph_to_function(scope, id);
            }
            None => {
                if expr::intrinsic(name.as_str()).is_some() {
                    let id = self.intrinsic_symbol(name.as_str(), name.span);
                    name.symbol = Some(id);
                } else {
                    let id = self.implicit_external(scope, name, true);
                    name.symbol = Some(id);
                }
            }
        }
    }

    fn resolve_call_name(&mut self, scope: ScopeId, name: &mut Name) {
        if name.symbol.is_none() {
            if let Some(id) = self.lookup(scope, name.as_str()) {
                name.symbol = Some(id);
            }
        }
        match name.symbol {
            Some(id) => {
                self.ctx.symbol_mut(id).flags |= SymbolFlags::USED;
            }
            None => {
                let id = self.implicit_external(scope, name, false);
                name.symbol = Some(id);
            }
        }
    }

    /// An untyped or scalar-typed object referenced as `f(...)` is a
    /// reference to an external function of that type
    fn maybe_morph_to_function(&mut self, scope: ScopeId, id: SymbolId) {
        let ultimate = self.ctx.ultimate(id);
        let symbol = self.ctx.symbol(ultimate);
        if symbol.owner != scope {
            return;
        }
        let eligible = symbol.object().is_some_and(|object| {
            object.rank() == 0
                && object.common.is_none()
                && object.init.is_none()
                && object.value.is_none()
        }) && !symbol.flags.intersects(
            SymbolFlags::DUMMY
                | SymbolFlags::FUNCTION_RESULT
                | SymbolFlags::PARAMETER
                | SymbolFlags::DATA_INIT
                | SymbolFlags::EQUIVALENCED,
        );
        if !eligible {
            return;
        }
        let decl_type = match symbol.type_desc().copied() {
            Some(ty) => Some(ty),
            None => Some(self.implicit_type(&symbol.name)),
        };
        let name = symbol.name.clone();
        let owner = symbol.owner;
        let span = symbol.span;
        let result = self.ctx.new_symbol(
            Symbol::new(
                name,
                owner,
                span,
                SymbolDetails::Object(ObjectDetails {
                    decl_type,
                    ..ObjectDetails::default()
                }),
            )
            .with_flags(SymbolFlags::FUNCTION_RESULT | SymbolFlags::COMPILER_CREATED),
        );
        self.ctx.symbol_mut(ultimate).details =
            SymbolDetails::Subprogram(SubprogramDetails {
                is_function: true,
                result: Some(result),
                ..SubprogramDetails::default()
            });
    }

    fn intrinsic_symbol(&mut self, name: &str, span: SimpleSpan<usize>) -> SymbolId {
        let global = self.ctx.global_scope();
        if let Some(id) = self.ctx.scope(global).find_symbol(name) {
            return id;
        }
        let id = self.ctx.new_symbol(
            Symbol::new(name, global, span, SymbolDetails::Intrinsic)
                .with_flags(SymbolFlags::COMPILER_CREATED),
        );
        self.ctx
            .scope_mut(global)
            .insert_symbol(SmolStr::new(name), id);
        id
    }

    fn implicit_external(&mut self, scope: ScopeId, name: &Name, is_function: bool) -> SymbolId {
        let result = is_function.then(|| {
            let decl_type = Some(self.implicit_type(name.as_str()));
            self.ctx.new_symbol(
                Symbol::new(
                    name.text.clone(),
                    scope,
                    name.span,
                    SymbolDetails::Object(ObjectDetails {
                        decl_type,
                        ..ObjectDetails::default()
                    }),
                )
                .with_flags(SymbolFlags::FUNCTION_RESULT | SymbolFlags::COMPILER_CREATED),
            )
        });
        let id = self.ctx.new_symbol(
            Symbol::new(
                name.text.clone(),
                scope,
                name.span,
                SymbolDetails::Subprogram(SubprogramDetails {
                    is_function,
                    result,
                    ..SubprogramDetails::default()
                }),
            )
            .with_flags(SymbolFlags::IMPLICIT | SymbolFlags::USED),
        );
        self.ctx.scope_mut(scope).insert_symbol(name.text.clone(), id);
        id
    }

    fn resolve_entry(
        &mut self,
        scope: ScopeId,
        span: SimpleSpan<usize>,
        name: &mut Name,
        dummy_args: &mut [Name],
        result: Option<&mut Name>,
    ) {
        let unit_scope = self.ctx.scopes.enclosing_unit(scope);
        let Some(unit_symbol) = self.ctx.scope(unit_scope).symbol else {
            self.ctx.error(
                DiagnosticCode::MisplacedEntry,
                "ENTRY may only appear in a function or subroutine".to_string(),
                span,
            );
            return;
        };
        let is_function = match self.ctx.symbol(unit_symbol).subprogram() {
            Some(details) => details.is_function,
            None => {
                self.ctx.error(
                    DiagnosticCode::MisplacedEntry,
                    "ENTRY may only appear in a function or subroutine".to_string(),
                    span,
                );
                return;
            }
        };
        let parent = self
            .ctx
            .scope(unit_scope)
            .parent
            .unwrap_or_else(|| self.ctx.global_scope());
        let Some(entry_id) = self.ctx.scope(parent).find_symbol(name.as_str()) else {
            // binding failed earlier with a duplicate-name error
            return;
        };
        name.symbol = Some(entry_id);
        self.declare_dummies(scope, dummy_args);
        let dummy_ids = self.dummy_ids(scope, dummy_args);
        let result_id = if is_function {
            let result_name = match &result {
                Some(name) => (*name).clone(),
                None => name.clone(),
            };
            let id = match self.ctx.scope(scope).find_symbol(result_name.as_str()) {
                // A declaration may have typed the result before the ENTRY
                Some(id) => {
                    self.ctx.symbol_mut(id).flags |= SymbolFlags::FUNCTION_RESULT;
                    id
                }
                None => self.declare_result(scope, &result_name, None),
            };
            Some(id)
        } else {
            None
        };
        if let Some(result_name) = result {
            result_name.symbol = result_id;
        }
        if let Some(details) = self.ctx.symbol_mut(entry_id).subprogram_mut() {
            details.scope = Some(scope);
            details.dummy_args = dummy_ids;
            details.result = result_id;
        }
        if let Some(details) = self.ctx.symbol_mut(unit_symbol).subprogram_mut() {
            details.entries.push(entry_id);
        }
    }
}

/// Visit each block nested in a construct
fn each_block(construct: &Construct, f: &mut impl FnMut(&Block)) {
    match construct {
        Construct::If(c) => {
            for arm in &c.arms {
                f(&arm.block);
            }
            if let Some(else_block) = &c.else_block {
                f(else_block);
            }
        }
        Construct::Do(c) => f(&c.body),
        Construct::Forall(c) => f(&c.body),
        Construct::Case(c) => {
            for arm in &c.arms {
                f(&arm.block);
            }
        }
        Construct::Parallel(c) => f(&c.body),
        Construct::Offload(c) => f(&c.body),
        Construct::Simd(c) => f(&c.body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonicalize::{canonicalize_do, canonicalize_extensions};
    use ferro_compiler_parser::parse_source;

    fn resolve(source: &str) -> (SemanticsContext, Program) {
        let output = parse_source(source);
        assert!(
            output.diagnostics.is_empty(),
            "unexpected parse errors: {:?}",
            output.diagnostics
        );
        let mut program = output.program;
        let mut ctx = SemanticsContext::default();
        canonicalize_do(&mut ctx, &mut program);
        canonicalize_extensions(&mut ctx, &mut program);
        resolve_names(&mut ctx, &mut program);
        (ctx, program)
    }

    fn unit_scope(ctx: &SemanticsContext, name: &str) -> ScopeId {
        ctx.scopes
            .iter()
            .find(|(_, scope)| scope.name == name)
            .map(|(id, _)| id)
            .unwrap_or_else(|| panic!("no scope named '{name}'"))
    }

    fn symbol_in<'c>(
        ctx: &'c SemanticsContext,
        scope: ScopeId,
        name: &str,
    ) -> &'c Symbol {
        let id = ctx
            .scope(scope)
            .find_symbol(name)
            .unwrap_or_else(|| panic!("no symbol '{name}'"));
        ctx.symbol(id)
    }

    #[test]
    fn test_declared_objects_are_typed() {
        let (ctx, _) = resolve(
            "program p\n\
             integer(8) n\n\
             real x\n\
             character(10) c\n\
             n = 1\n\
             x = 2.0\n\
             end program\n",
        );
        assert!(!ctx.any_fatal_error());
        let scope = unit_scope(&ctx, "p");
        assert_eq!(
            symbol_in(&ctx, scope, "n").type_desc(),
            Some(&TypeDesc::Integer { kind: 8 })
        );
        assert_eq!(
            symbol_in(&ctx, scope, "x").type_desc(),
            Some(&TypeDesc::Real { kind: 4 })
        );
        assert_eq!(
            symbol_in(&ctx, scope, "c").type_desc(),
            Some(&TypeDesc::Character { len: 10 })
        );
    }

    #[test]
    fn test_implicit_typing_by_first_letter() {
        let (ctx, _) = resolve(
            "program p\n\
             index = 1\n\
             value = 2.5\n\
             end program\n",
        );
        assert!(!ctx.any_fatal_error());
        let scope = unit_scope(&ctx, "p");
        let index = symbol_in(&ctx, scope, "index");
        assert!(index.flags.contains(SymbolFlags::IMPLICIT));
        assert_eq!(index.type_desc(), Some(&TypeDesc::Integer { kind: 4 }));
        assert_eq!(
            symbol_in(&ctx, scope, "value").type_desc(),
            Some(&TypeDesc::Real { kind: 4 })
        );
    }

    #[test]
    fn test_implicit_none_rejects_undeclared() {
        let (ctx, _) = resolve(
            "program p\n\
             implicit none\n\
             x = 1.0\n\
             end program\n",
        );
        assert!(ctx.any_fatal_error());
        assert!(ctx.sink().errors()[0]
            .message
            .contains("No explicit type declared for 'x'"));
    }

    #[test]
    fn test_function_result_and_dummies() {
        let (ctx, _) = resolve(
            "integer function twice(n) result(r)\n\
             integer n\n\
             r = 2 * n\n\
             end function\n",
        );
        assert!(!ctx.any_fatal_error());
        let scope = unit_scope(&ctx, "twice");
        let result = symbol_in(&ctx, scope, "r");
        assert!(result.flags.contains(SymbolFlags::FUNCTION_RESULT));
        assert_eq!(result.type_desc(), Some(&TypeDesc::Integer { kind: 4 }));
        let dummy = symbol_in(&ctx, scope, "n");
        assert!(dummy.flags.contains(SymbolFlags::DUMMY));
        let global = ctx.global_scope();
        let function = symbol_in(&ctx, global, "twice");
        let details = function.subprogram().unwrap();
        assert!(details.is_function);
        assert_eq!(details.dummy_args.len(), 1);
        assert!(details.result.is_some());
    }

    #[test]
    fn test_parameter_value_feeds_array_bound() {
        let (ctx, _) = resolve(
            "program p\n\
             integer, parameter :: n = 4\n\
             real a(n)\n\
             a(1) = 0.0\n\
             end program\n",
        );
        assert!(!ctx.any_fatal_error());
        let scope = unit_scope(&ctx, "p");
        let array = symbol_in(&ctx, scope, "a");
        let object = array.object().unwrap();
        assert_eq!(object.shape, vec![Extent { lower: 1, upper: 4 }]);
    }

    #[test]
    fn test_parameter_without_value_is_an_error() {
        let (ctx, _) = resolve(
            "program p\n\
             integer, parameter :: n\n\
             end program\n",
        );
        assert!(ctx.any_fatal_error());
        assert!(ctx.sink().errors()[0].message.contains("must have a value"));
    }

    #[test]
    fn test_common_membership() {
        let (ctx, _) = resolve(
            "program p\n\
             integer a, b\n\
             common /blk/ a, b\n\
             a = 1\n\
             end program\n",
        );
        assert!(!ctx.any_fatal_error());
        let scope = unit_scope(&ctx, "p");
        let block_id = *ctx.scope(scope).common_blocks.get("blk").unwrap();
        let block = ctx.symbol(block_id).common_block().unwrap();
        assert_eq!(block.objects.len(), 2);
        let a = symbol_in(&ctx, scope, "a");
        assert_eq!(a.object().unwrap().common, Some(block_id));
    }

    #[test]
    fn test_object_in_two_commons_is_an_error() {
        let (ctx, _) = resolve(
            "program p\n\
             integer a\n\
             common /x/ a\n\
             common /y/ a\n\
             end program\n",
        );
        assert!(ctx.any_fatal_error());
        assert!(ctx.sink().errors()[0]
            .message
            .contains("already in a COMMON block"));
    }

    #[test]
    fn test_equivalence_sets_recorded() {
        let (ctx, _) = resolve(
            "program p\n\
             integer a(10), b\n\
             equivalence (a(3), b)\n\
             end program\n",
        );
        assert!(!ctx.any_fatal_error());
        let scope = unit_scope(&ctx, "p");
        let sets = &ctx.scope(scope).equivalence_sets;
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].len(), 2);
        assert_eq!(sets[0][0].subscripts, vec![3]);
        let b = symbol_in(&ctx, scope, "b");
        assert!(b.flags.contains(SymbolFlags::EQUIVALENCED));
    }

    #[test]
    fn test_derived_type_components() {
        let (ctx, _) = resolve(
            "program p\n\
             type point\n\
             real x\n\
             real y\n\
             end type\n\
             type(point) origin\n\
             end program\n",
        );
        assert!(!ctx.any_fatal_error());
        let scope = unit_scope(&ctx, "p");
        let point = symbol_in(&ctx, scope, "point");
        let SymbolDetails::DerivedType { scope: type_scope } = point.details else {
            panic!("expected a derived type");
        };
        assert_eq!(ctx.scope(type_scope).symbol_count(), 2);
        let origin = symbol_in(&ctx, scope, "origin");
        assert!(matches!(origin.type_desc(), Some(TypeDesc::Derived(_))));
    }

    #[test]
    fn test_contained_function_visible_from_host() {
        let (ctx, _) = resolve(
            "program p\n\
             integer y\n\
             y = g(1)\n\
             contains\n\
             integer function g(n)\n\
             integer n\n\
             g = n\n\
             end function\n\
             end program\n",
        );
        assert!(!ctx.any_fatal_error());
        let scope = unit_scope(&ctx, "p");
        let g = symbol_in(&ctx, scope, "g");
        assert!(g.subprogram().unwrap().is_function);
    }

    #[test]
    fn test_duplicate_unit_names_conflict() {
        let (ctx, _) = resolve(
            "subroutine s\n\
             end subroutine\n\
             subroutine s\n\
             end subroutine\n",
        );
        assert!(ctx.any_fatal_error());
        assert!(ctx.sink().errors()[0].message.contains("already declared"));
    }

    #[test]
    fn test_intrinsic_reference() {
        let (ctx, _) = resolve(
            "program p\n\
             real x\n\
             x = abs(-2.5)\n\
             end program\n",
        );
        assert!(!ctx.any_fatal_error());
        let global = ctx.global_scope();
        let abs = symbol_in(&ctx, global, "abs");
        assert!(matches!(abs.details, SymbolDetails::Intrinsic));
    }

    #[test]
    fn test_typed_scalar_morphs_into_external_function() {
        let (ctx, _) = resolve(
            "program p\n\
             integer f, y\n\
             y = f(2)\n\
             end program\n",
        );
        assert!(!ctx.any_fatal_error());
        let scope = unit_scope(&ctx, "p");
        let f = symbol_in(&ctx, scope, "f");
        let details = f.subprogram().expect("f should have become a function");
        assert!(details.is_function);
        let result = details.result.expect("morphed function keeps its type");
        assert_eq!(
            ctx.symbol(result).type_desc(),
            Some(&TypeDesc::Integer { kind: 4 })
        );
    }

    #[test]
    fn test_entry_binds_in_global_scope() {
        let (ctx, _) = resolve(
            "subroutine s\n\
             integer k\n\
             k = 1\n\
             entry other(k)\n\
             k = 2\n\
             end subroutine\n\
             program p\n\
             call other(3)\n\
             end program\n",
        );
        assert!(!ctx.any_fatal_error());
        let global = ctx.global_scope();
        let entry = symbol_in(&ctx, global, "other");
        let details = entry.subprogram().unwrap();
        assert!(details.is_entry);
        assert!(!details.is_function);
        assert_eq!(details.dummy_args.len(), 1);
    }

    #[test]
    fn test_use_of_earlier_module() {
        let (ctx, _) = resolve(
            "module constants\n\
             integer, parameter :: answer = 42\n\
             end module\n\
             program p\n\
             use constants\n\
             integer y\n\
             y = answer\n\
             end program\n",
        );
        assert!(!ctx.any_fatal_error());
        let scope = unit_scope(&ctx, "p");
        let alias = symbol_in(&ctx, scope, "answer");
        assert!(matches!(alias.details, SymbolDetails::Use { .. }));
        let id = ctx.scope(scope).find_symbol("answer").unwrap();
        let ultimate = ctx.symbol(ctx.ultimate(id));
        assert!(ultimate.is_named_constant());
        assert_eq!(
            ultimate.object().unwrap().value,
            Some(ConstValue::Int(42))
        );
    }

    #[test]
    fn test_missing_module_is_an_error() {
        let (ctx, _) = resolve(
            "program p\n\
             use nowhere\n\
             end program\n",
        );
        assert!(ctx.any_fatal_error());
        assert!(ctx.sink().errors()[0]
            .message
            .contains("Module 'nowhere' was not found"));
    }
}
