use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use scroll::{Endian, Pwrite};
use tracing_subscriber::{fmt, EnvFilter};

use physnap::common::{ChunkCode, PointerWidth, Precision};
use physnap::dna::Catalog;
use physnap::snapshot::{Serializer, SerializerOptions, Snapshot};

const BOX_SHAPE_PROXYTYPE: i32 = 0;
const HINGE_CONSTRAINT_TYPE: i32 = 4;
const IDENTITY_BASIS: [f32; 12] = [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0];

/// Writes field values into the payload of one struct element by field path.
struct FieldWriter<'p, 'c> {
    catalog: &'c Catalog<'c>,
    struct_index: usize,
    payload: &'p mut [u8],
    endian: Endian,
}

impl<'p, 'c> FieldWriter<'p, 'c> {
    fn new(catalog: &'c Catalog<'c>, struct_type: &str, payload: &'p mut [u8]) -> Result<Self> {
        let struct_index = catalog
            .lookup_struct(struct_type)
            .ok_or_else(|| anyhow!("unknown struct type {}", struct_type))?;

        Ok(Self {
            catalog,
            struct_index,
            payload,
            endian: catalog.endianness().into(),
        })
    }

    /// Resolves a dotted path like `m_collisionObjectData.m_friction` to an offset and size.
    fn resolve(&self, path: &str) -> Result<(usize, usize, bool)> {
        let mut struct_index = self.struct_index;
        let mut offset = 0;
        let mut segments = path.split('.').peekable();

        while let Some(segment) = segments.next() {
            let field = self
                .catalog
                .field(struct_index, segment)
                .ok_or_else(|| anyhow!("no field {} in {}", segment, path))?;
            offset += field.offset;

            if segments.peek().is_none() {
                return Ok((offset, field.size, field.is_pointer()));
            }

            struct_index = self
                .catalog
                .lookup_struct(field.type_name)
                .ok_or_else(|| anyhow!("field {} is not a struct", segment))?;
        }

        bail!("empty field path")
    }

    fn floats(&mut self, path: &str, values: &[f32]) -> Result<()> {
        let (mut offset, size, _) = self.resolve(path)?;
        if values.len() * 4 > size {
            bail!("{} values do not fit {}", values.len(), path);
        }
        for value in values {
            self.payload.gwrite_with(*value, &mut offset, self.endian)?;
        }
        Ok(())
    }

    fn int(&mut self, path: &str, value: i32) -> Result<()> {
        let (offset, size, _) = self.resolve(path)?;
        if size < 4 {
            bail!("{} is too small for an int", path);
        }
        self.payload.pwrite_with(value, offset, self.endian)?;
        Ok(())
    }

    fn pointer(&mut self, path: &str, address: u64) -> Result<()> {
        let (offset, _, is_pointer) = self.resolve(path)?;
        if !is_pointer {
            bail!("{} is not a pointer", path);
        }
        match self.catalog.pointer_width() {
            PointerWidth::Four => {
                self.payload
                    .pwrite_with(u32::try_from(address)?, offset, self.endian)?;
            }
            PointerWidth::Eight => {
                self.payload.pwrite_with(address, offset, self.endian)?;
            }
        }
        Ok(())
    }

    fn transform(&mut self, path: &str, origin: [f32; 3]) -> Result<()> {
        self.floats(&format!("{}.m_basis", path), &IDENTITY_BASIS)?;
        self.floats(&format!("{}.m_origin", path), &origin)
    }
}

fn write_object<F>(
    serializer: &mut Serializer<'_>,
    struct_type: &str,
    code: ChunkCode,
    address: u64,
    fill: F,
) -> Result<()>
where
    F: FnOnce(&mut FieldWriter<'_, '_>) -> Result<()>,
{
    let catalog = serializer.catalog();
    let index = catalog
        .lookup_struct(struct_type)
        .ok_or_else(|| anyhow!("unknown struct type {}", struct_type))?;
    let len = catalog
        .struct_len(index)
        .ok_or_else(|| anyhow!("missing struct {}", index))?;

    let handle = serializer.allocate(len, 1)?;
    let mut writer = FieldWriter::new(catalog, struct_type, serializer.payload_mut(&handle)?)?;
    fill(&mut writer)?;
    serializer.finalize_chunk(&handle, struct_type, code, address)?;
    Ok(())
}

fn box_shape(writer: &mut FieldWriter<'_, '_>, half_extents: [f32; 3]) -> Result<()> {
    writer.int("m_collisionShapeData.m_shapeType", BOX_SHAPE_PROXYTYPE)?;
    writer.floats("m_localScaling", &[1.0, 1.0, 1.0])?;
    writer.floats("m_implicitShapeDimensions", &half_extents)?;
    writer.floats("m_collisionMargin", &[0.04])
}

fn rigid_body(
    writer: &mut FieldWriter<'_, '_>,
    shape: u64,
    origin: [f32; 3],
    mass: f32,
) -> Result<()> {
    let inverse_mass = if mass > 0.0 { 1.0 / mass } else { 0.0 };
    writer.pointer("m_collisionObjectData.m_collisionShape", shape)?;
    writer.transform("m_collisionObjectData.m_worldTransform", origin)?;
    writer.floats("m_collisionObjectData.m_friction", &[0.5])?;
    writer.floats("m_gravity", &[0.0, -10.0, 0.0])?;
    writer.floats("m_linearFactor", &[1.0, 1.0, 1.0])?;
    writer.floats("m_angularFactor", &[1.0, 1.0, 1.0])?;
    writer.floats("m_inverseMass", &[inverse_mass])
}

fn write_scene(path: &Path, options: SerializerOptions) -> Result<()> {
    let catalog = Catalog::builtin(options.pointer_width)?;
    let mut serializer = Serializer::new(catalog, options)?;
    serializer.start_session()?;

    let ground_shape = 0x1000;
    let chassis_shape = 0x1100;
    let ground = 0x2000;
    let chassis = 0x2100;

    write_object(
        &mut serializer,
        "btConvexInternalShapeData",
        ChunkCode::BOX_SHAPE,
        ground_shape,
        |w| box_shape(w, [50.0, 1.0, 50.0]),
    )?;
    write_object(
        &mut serializer,
        "btConvexInternalShapeData",
        ChunkCode::BOX_SHAPE,
        chassis_shape,
        |w| box_shape(w, [1.0, 0.5, 2.0]),
    )?;
    write_object(
        &mut serializer,
        "btRigidBodyFloatData",
        ChunkCode::RIGID_BODY,
        ground,
        |w| rigid_body(w, ground_shape, [0.0, -1.0, 0.0], 0.0),
    )?;
    write_object(
        &mut serializer,
        "btRigidBodyFloatData",
        ChunkCode::RIGID_BODY,
        chassis,
        |w| rigid_body(w, chassis_shape, [0.0, 1.0, 0.0], 800.0),
    )?;
    write_object(
        &mut serializer,
        "btHingeConstraintFloatData",
        ChunkCode::CONSTRAINT,
        0x3000,
        |w| {
            w.pointer("m_typeConstraintData.m_rbA", ground)?;
            w.pointer("m_typeConstraintData.m_rbB", chassis)?;
            w.int("m_typeConstraintData.m_objectType", HINGE_CONSTRAINT_TYPE)?;
            w.transform("m_rbAFrame", [0.0, 0.0, 0.0])?;
            w.transform("m_rbBFrame", [0.0, -2.0, 0.0])?;
            w.floats("m_lowerLimit", &[-0.5])?;
            w.floats("m_upperLimit", &[0.5])
        },
    )?;

    serializer.end_session()?;

    let file = std::fs::File::create(path)
        .with_context(|| format!("cannot create {}", path.display()))?;
    serializer.write_to(file)?;

    println!(
        "Wrote {} chunks ({} bytes) to {}",
        serializer.chunks().len(),
        serializer.len(),
        path.display()
    );
    Ok(())
}

fn print_catalog(catalog: &Catalog<'_>, filter: Option<&String>) -> Result<()> {
    println!("Catalog:");
    println!("  pointer width: {}", catalog.pointer_width());
    println!("  endianness:    {}", catalog.endianness());
    println!("  length:        {} bytes", catalog.len());
    println!("  types:         {}", catalog.type_count());
    println!("  structs:       {}", catalog.structs().len());
    println!();

    for index in 0..catalog.structs().len() {
        let name = catalog.struct_name(index).unwrap_or("?");
        if filter.map_or(false, |filter| filter != name) {
            continue;
        }

        let len = catalog.struct_len(index).unwrap_or_default();
        println!("{:>4} {} ({} bytes)", index, name, len);

        if filter.is_some() {
            let fields = catalog
                .fields(index)
                .ok_or_else(|| anyhow!("missing struct {}", index))?;
            for field in fields {
                println!(
                    "       {:>5} {:>4}  {} {}",
                    field.offset, field.size, field.type_name, field.name
                );
            }
        }
    }

    Ok(())
}

fn inspect(path: &Path, show_catalog: bool) -> Result<()> {
    let data =
        std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    let snapshot = Snapshot::parse(&data)?;

    println!("Snapshot: {}", snapshot.header());
    println!("Chunks:");
    for chunk in snapshot.chunks() {
        println!(
            "  {:>8x} {} {:<32} x{:<4} {:>6} bytes  at {:#x}",
            chunk.offset(),
            chunk.code(),
            snapshot.struct_name(chunk).unwrap_or("<unknown>"),
            chunk.count(),
            chunk.payload().len(),
            chunk.original_address(),
        );
    }

    if show_catalog {
        println!();
        print_catalog(snapshot.catalog(), None)?;
    }

    Ok(())
}

fn execute(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("catalog", sub)) => {
            let width = sub
                .get_one::<PointerWidth>("pointer_width")
                .copied()
                .unwrap_or_else(PointerWidth::host);
            let catalog = Catalog::builtin(width)?;
            print_catalog(catalog, sub.get_one::<String>("struct"))
        }
        Some(("write", sub)) => {
            // clap enforces required arguments
            let path = sub.get_one::<PathBuf>("output").unwrap();
            let mut options = SerializerOptions::default();
            if let Some(width) = sub.get_one::<PointerWidth>("pointer_width") {
                options = options.with_pointer_width(*width);
            }
            if let Some(precision) = sub.get_one::<Precision>("precision") {
                options = options.with_precision(*precision);
            }
            if let Some(capacity) = sub.get_one::<usize>("capacity") {
                options = options.with_capacity(*capacity);
            }
            write_scene(path, options)
        }
        Some(("inspect", sub)) => {
            let path = sub.get_one::<PathBuf>("path").unwrap();
            inspect(path, sub.get_flag("show_catalog"))
        }
        _ => bail!("no command given"),
    }
}

fn pointer_width_arg() -> Arg {
    Arg::new("pointer_width")
        .long("pointer-width")
        .value_name("WIDTH")
        .value_parser(value_parser!(PointerWidth))
        .help("Pointer model of the catalog: 4, 8 or host")
}

fn main() {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .event_format(
            tracing_subscriber::fmt::format()
                .compact()
                .with_target(false)
                .without_time(),
        )
        .init();

    let matches = Command::new("snapshot-debug")
        .about("Works with physics snapshots and their struct catalogs")
        .subcommand_required(true)
        .subcommand(
            Command::new("catalog")
                .about("Prints the built-in struct catalog")
                .arg(pointer_width_arg())
                .arg(
                    Arg::new("struct")
                        .short('s')
                        .long("struct")
                        .value_name("NAME")
                        .help("Only print this struct, including its fields"),
                ),
        )
        .subcommand(
            Command::new("write")
                .about("Writes a small demo scene into a snapshot file")
                .arg(
                    Arg::new("output")
                        .required(true)
                        .value_name("PATH")
                        .value_parser(value_parser!(PathBuf))
                        .help("Path of the snapshot file to write")
                        .index(1),
                )
                .arg(pointer_width_arg())
                .arg(
                    Arg::new("precision")
                        .long("precision")
                        .value_name("PRECISION")
                        .value_parser(value_parser!(Precision))
                        .help("Numeric precision recorded in the header: single or double"),
                )
                .arg(
                    Arg::new("capacity")
                        .long("capacity")
                        .value_name("BYTES")
                        .value_parser(value_parser!(usize))
                        .help("Size of the output buffer"),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .about("Lists the chunks of a snapshot file")
                .arg(
                    Arg::new("path")
                        .required(true)
                        .value_name("PATH")
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to the snapshot file")
                        .index(1),
                )
                .arg(
                    Arg::new("show_catalog")
                        .short('c')
                        .long("catalog")
                        .action(ArgAction::SetTrue)
                        .help("Also print the catalog trailer"),
                ),
        )
        .get_matches();

    if let Err(e) = execute(&matches) {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}
