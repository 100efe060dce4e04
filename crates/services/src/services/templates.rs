//! Pure renderers for every file of a generated backend.
//!
//! Output is a Node/Express/Mongoose project with one fixed shape: a model, a controller
//! and a routes file per entity, plus shared bootstrap files. Everything here is
//! deterministic and touches no filesystem.

use std::fmt::Write as _;

use db::models::project_entity::EntityDescriptor;
use serde_json::json;
use utils::text::{capitalize_first, slugify};

use super::field_classifier::{
    ClassifiedField, ROLE_VALUES, STATUS_VALUES, SemanticType, relation_name,
};

/// Project-level data the shared files are derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    pub name: String,
    pub description: String,
}

/// Identifiers derived from an entity name. The name is expected to already be
/// alphanumeric; nothing is sanitized here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityNames {
    /// `Employee`: model name and model file stem.
    pub model: String,
    /// `employee`: controller/routes file prefix and local variables.
    pub lower: String,
    /// `employees`: collection variables and mount path.
    pub plural: String,
}

impl EntityNames {
    pub fn of(entity: &EntityDescriptor) -> Self {
        let lower = entity.name.to_lowercase();
        Self {
            model: capitalize_first(&entity.name),
            plural: format!("{lower}s"),
            lower,
        }
    }

    pub fn model_file(&self) -> String {
        format!("{}.js", self.model)
    }

    pub fn controller_file(&self) -> String {
        format!("{}Controller.js", self.lower)
    }

    pub fn routes_file(&self) -> String {
        format!("{}Routes.js", self.lower)
    }

    pub fn mount_path(&self) -> String {
        format!("/api/{}", self.plural)
    }
}

fn js_key(name: &str) -> String {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    };
    if valid {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}

/// Text for a `//` comment: every JS line terminator becomes a space.
fn line_comment(text: &str) -> String {
    text.replace(['\r', '\n', '\u{2028}', '\u{2029}'], " ")
}

fn js_string_list(values: &[&str]) -> String {
    values
        .iter()
        .map(|v| format!("'{v}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Schema fragment for one field: storage type, default, and validation.
pub fn field_definition(field: &ClassifiedField) -> String {
    match field.semantic_type {
        SemanticType::IdentifierReference => format!(
            "{{ type: mongoose.Schema.Types.ObjectId, ref: '{}' }}",
            relation_name(&field.name)
        ),
        SemanticType::Date => "{ type: Date, default: Date.now }".to_string(),
        SemanticType::MediaUrl => "{ type: String, default: '' }".to_string(),
        SemanticType::Currency => "{ type: Number, default: 0 }".to_string(),
        SemanticType::Status => format!(
            "{{ type: String, enum: [{}], default: '{}' }}",
            js_string_list(&STATUS_VALUES),
            STATUS_VALUES[0]
        ),
        SemanticType::Password => "{ type: String, required: true, minlength: 6 }".to_string(),
        SemanticType::Email => concat!(
            "{ type: String, required: true, unique: true, ",
            r"match: [/^\S+@\S+\.\S+$/, 'Please provide a valid email address'] }"
        )
        .to_string(),
        SemanticType::Role => format!(
            "{{ type: String, enum: [{}], default: '{}' }}",
            js_string_list(&ROLE_VALUES),
            ROLE_VALUES[0]
        ),
        SemanticType::Text => "{ type: String, required: true, trim: true }".to_string(),
    }
}

/// Mongoose schema and model. One property line per classified field, in order.
pub fn render_model(entity: &EntityDescriptor, fields: &[ClassifiedField]) -> String {
    let names = EntityNames::of(entity);
    let mut out = String::new();
    out.push_str("const mongoose = require('mongoose');\n\n");
    if !entity.description.is_empty() {
        let _ = writeln!(out, "// {}", line_comment(&entity.description));
    }
    let _ = writeln!(out, "const {}Schema = new mongoose.Schema(", names.lower);
    out.push_str("  {\n");
    for field in fields {
        let _ = writeln!(out, "    {}: {},", js_key(&field.name), field_definition(field));
    }
    out.push_str("  },\n");
    out.push_str("  { timestamps: true }\n");
    out.push_str(");\n\n");
    let _ = writeln!(
        out,
        "module.exports = mongoose.model('{}', {}Schema);",
        names.model, names.lower
    );
    out
}

/// The five CRUD handlers for an entity.
pub fn render_controller(entity: &EntityDescriptor) -> String {
    let EntityNames {
        model,
        lower,
        plural,
    } = EntityNames::of(entity);

    format!(
        r#"const {model} = require('../models/{model}');

// GET /
exports.get{model}s = async (req, res, next) => {{
  try {{
    const {plural} = await {model}.find();
    res.status(200).json({{ success: true, count: {plural}.length, data: {plural} }});
  }} catch (err) {{
    next(err);
  }}
}};

// GET /:id
exports.get{model} = async (req, res, next) => {{
  try {{
    const {lower} = await {model}.findById(req.params.id);
    if (!{lower}) {{
      return res.status(404).json({{ success: false, error: '{model} not found' }});
    }}
    res.status(200).json({{ success: true, data: {lower} }});
  }} catch (err) {{
    next(err);
  }}
}};

// POST /
exports.create{model} = async (req, res, next) => {{
  try {{
    const {lower} = await {model}.create(req.body);
    res.status(201).json({{ success: true, data: {lower} }});
  }} catch (err) {{
    next(err);
  }}
}};

// PUT /:id
exports.update{model} = async (req, res, next) => {{
  try {{
    const {lower} = await {model}.findByIdAndUpdate(req.params.id, req.body, {{
      new: true,
      runValidators: true,
    }});
    if (!{lower}) {{
      return res.status(404).json({{ success: false, error: '{model} not found' }});
    }}
    res.status(200).json({{ success: true, data: {lower} }});
  }} catch (err) {{
    next(err);
  }}
}};

// DELETE /:id
exports.delete{model} = async (req, res, next) => {{
  try {{
    const {lower} = await {model}.findByIdAndDelete(req.params.id);
    if (!{lower}) {{
      return res.status(404).json({{ success: false, error: '{model} not found' }});
    }}
    res.status(200).json({{ success: true, data: {{}} }});
  }} catch (err) {{
    next(err);
  }}
}};
"#
    )
}

/// Route table wiring the controller quintet.
pub fn render_routes(entity: &EntityDescriptor) -> String {
    let EntityNames { model, lower, .. } = EntityNames::of(entity);

    format!(
        r#"const express = require('express');
const {{
  get{model}s,
  get{model},
  create{model},
  update{model},
  delete{model},
}} = require('../controllers/{lower}Controller');

const router = express.Router();

router.get('/', get{model}s);
router.post('/', create{model});
router.get('/:id', get{model});
router.put('/:id', update{model});
router.delete('/:id', delete{model});

module.exports = router;
"#
    )
}

/// `package.json` manifest.
pub fn render_manifest(project: &ProjectInfo) -> String {
    let manifest = json!({
        "name": slugify(&project.name),
        "version": "1.0.0",
        "description": project.description,
        "main": "server.js",
        "scripts": {
            "start": "node server.js",
            "dev": "nodemon server.js"
        },
        "dependencies": {
            "cors": "^2.8.5",
            "dotenv": "^16.4.5",
            "express": "^4.19.2",
            "mongoose": "^8.4.0",
            "morgan": "^1.10.0"
        },
        "devDependencies": {
            "nodemon": "^3.1.0"
        }
    });
    // Serializing a `Value` cannot fail.
    let mut out = serde_json::to_string_pretty(&manifest).unwrap_or_default();
    out.push('\n');
    out
}

pub fn render_env_template(project: &ProjectInfo) -> String {
    format!(
        "NODE_ENV=development\nPORT=5000\nMONGO_URI=mongodb://localhost:27017/{}\n",
        slugify(&project.name).replace('-', "_")
    )
}

/// Entry point with one route mount per entity, in entity order.
pub fn render_entry_point(project: &ProjectInfo, entities: &[EntityDescriptor]) -> String {
    let mut mounts = String::new();
    for entity in entities {
        let names = EntityNames::of(entity);
        let _ = writeln!(
            mounts,
            "app.use('{}', require('./routes/{}Routes'));",
            names.mount_path(),
            names.lower
        );
    }

    format!(
        r#"// {name}
require('dotenv').config();
const express = require('express');
const cors = require('cors');
const morgan = require('morgan');
const connectDB = require('./config/db');
const errorHandler = require('./middleware/errorHandler');

connectDB();

const app = express();

app.use(express.json());
app.use(cors());
if (process.env.NODE_ENV === 'development') {{
  app.use(morgan('dev'));
}}

{mounts}
app.use(errorHandler);

const PORT = process.env.PORT || 5000;

app.listen(PORT, () => {{
  console.log(`Server running in ${{process.env.NODE_ENV}} mode on port ${{PORT}}`);
}});
"#,
        name = line_comment(&project.name),
    )
}

pub fn render_datastore_connector() -> String {
    r#"const mongoose = require('mongoose');

const connectDB = async () => {
  try {
    const conn = await mongoose.connect(process.env.MONGO_URI);
    console.log(`MongoDB connected: ${conn.connection.host}`);
  } catch (err) {
    console.error(`MongoDB connection error: ${err.message}`);
    process.exit(1);
  }
};

module.exports = connectDB;
"#
    .to_string()
}

pub fn render_error_middleware() -> String {
    r#"const errorHandler = (err, req, res, next) => {
  let statusCode = err.statusCode || 500;
  let message = err.message || 'Server Error';

  if (err.name === 'CastError') {
    statusCode = 404;
    message = 'Resource not found';
  }

  if (err.code === 11000) {
    statusCode = 400;
    message = 'Duplicate field value entered';
  }

  if (err.name === 'ValidationError') {
    statusCode = 400;
    message = Object.values(err.errors)
      .map((val) => val.message)
      .join(', ');
  }

  res.status(statusCode).json({ success: false, error: message });
};

module.exports = errorHandler;
"#
    .to_string()
}
